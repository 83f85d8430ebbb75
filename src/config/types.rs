//! Configuration data types for containerbar.

use std::time::Duration;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::engine::{
    ApiVersion, ConnectionDescriptor, DEFAULT_SSH_PORT, DEFAULT_TLS_PORT, EngineConnector,
    SocketResolver, TlsMaterial,
};
use crate::error::{ConfigError, Result};
use crate::monitor::{DEFAULT_FAILURE_THRESHOLD, FetcherSettings};

/// How the daemon is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// A local Unix socket.
    #[default]
    Unix,
    /// A remote socket forwarded over SSH.
    Ssh,
    /// A TCP endpoint protected by TLS.
    Tls,
}

/// SSH tunnel settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SshConfig {
    /// Remote host name or address.
    pub host: Option<String>,

    /// Login user on the remote host.
    pub user: Option<String>,

    /// SSH port.
    pub port: u16,

    /// Daemon socket path on the remote host.
    pub remote_socket_path: Option<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: None,
            user: None,
            port: DEFAULT_SSH_PORT,
            remote_socket_path: None,
        }
    }
}

/// TLS settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Daemon host name.
    pub host: Option<String>,

    /// Daemon TCP port.
    pub port: u16,

    /// PEM bundle of CA certificates trusted for the daemon.
    pub ca_cert_path: Option<Utf8PathBuf>,

    /// PEM client certificate.
    pub client_cert_path: Option<Utf8PathBuf>,

    /// PEM private key for the client certificate.
    pub client_key_path: Option<Utf8PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_TLS_PORT,
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
        }
    }
}

impl TlsConfig {
    fn material(&self) -> TlsMaterial {
        TlsMaterial {
            ca_cert_path: self.ca_cert_path.clone(),
            client_cert_path: self.client_cert_path.clone(),
            client_key_path: self.client_key_path.clone(),
        }
    }
}

/// Connection selection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Which transport to use.
    pub kind: ConnectionKind,

    /// Settings used when `kind` is `ssh`.
    pub ssh: SshConfig,

    /// Settings used when `kind` is `tls`.
    pub tls: TlsConfig,
}

/// Refresh tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Minimum milliseconds between daemon refreshes.
    pub min_interval_ms: u64,

    /// Most running containers sampled per refresh.
    pub max_stats_containers: usize,

    /// Most statistics requests in flight at once.
    pub stats_concurrency: usize,

    /// Consecutive refresh failures hidden behind cached data.
    pub failure_threshold: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 2_000,
            max_stats_containers: 10,
            stats_concurrency: 10,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

impl FetcherConfig {
    /// Validates that concurrency and threshold are positive.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.stats_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: String::from("fetcher.stats_concurrency"),
                reason: String::from("must be at least 1"),
            }
            .into());
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: String::from("fetcher.failure_threshold"),
                reason: String::from("must be at least 1"),
            }
            .into());
        }
        Ok(())
    }

    /// The fetcher tunables these settings describe.
    #[must_use]
    pub const fn settings(&self) -> FetcherSettings {
        FetcherSettings {
            min_interval: Duration::from_millis(self.min_interval_ms),
            max_stats_containers: self.max_stats_containers,
            stats_concurrency: self.stats_concurrency,
            failure_threshold: self.failure_threshold,
        }
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `CONTAINERBAR_CONFIG_PATH` environment variable
/// 2. `.containerbar.toml` in the current working directory
/// 3. `.containerbar.toml` in the home directory
/// 4. `~/.config/containerbar/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "CONTAINERBAR",
    post_merge_hook,
    discovery(
        app_name = "containerbar",
        env_var = "CONTAINERBAR_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".containerbar.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The local daemon socket path or `unix://` URL.
    pub engine_socket: Option<String>,

    /// Daemon API version, such as `v1.43`.
    pub api_version: Option<String>,

    /// Connection selection.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub connection: ConnectionConfig,

    /// Refresh tuning.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub fetcher: FetcherConfig,
}

impl AppConfig {
    /// Checks values that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unparsable API version or
    /// unusable fetcher settings.
    pub fn validate(&self) -> Result<()> {
        self.api_version()?;
        self.fetcher.validate()
    }

    /// The configured API version, or the default.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `api_version` is malformed.
    pub fn api_version(&self) -> Result<ApiVersion> {
        let Some(raw) = non_blank(self.api_version.as_deref()) else {
            return Ok(ApiVersion::DEFAULT);
        };
        ApiVersion::parse(raw).map_err(|error| {
            ConfigError::InvalidValue {
                field: String::from("api_version"),
                reason: error.to_string(),
            }
            .into()
        })
    }

    /// Builds the descriptor for the configured connection.
    ///
    /// Unix connections resolve the socket through `resolver` when no
    /// `engine_socket` is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when the SSH host or user, or
    /// the TLS host, is absent, and `DaemonError::InvalidConfiguration` when
    /// the values present are unusable.
    pub fn connection_descriptor<E: mockable::Env>(
        &self,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<ConnectionDescriptor> {
        let descriptor = match self.connection.kind {
            ConnectionKind::Unix => {
                let socket = EngineConnector::resolve_socket(
                    non_blank(self.engine_socket.as_deref()),
                    resolver,
                )?;
                ConnectionDescriptor::unix_socket(socket)?
            }
            ConnectionKind::Ssh => {
                let ssh = &self.connection.ssh;
                let host = required(ssh.host.as_deref(), "connection.ssh.host")?;
                let user = required(ssh.user.as_deref(), "connection.ssh.user")?;
                ConnectionDescriptor::ssh_tunnel(
                    host,
                    user,
                    ssh.port,
                    non_blank(ssh.remote_socket_path.as_deref()),
                )?
            }
            ConnectionKind::Tls => {
                let tls = &self.connection.tls;
                let host = required(tls.host.as_deref(), "connection.tls.host")?;
                ConnectionDescriptor::tls(host, tls.port, tls.material())?
            }
        };
        Ok(descriptor)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required<'v>(value: Option<&'v str>, field: &str) -> Result<&'v str> {
    non_blank(value).ok_or_else(|| {
        ConfigError::MissingRequired {
            field: field.to_owned(),
        }
        .into()
    })
}

fn blank_to_none(value: &mut Option<String>) {
    if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
        *value = None;
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // An empty environment variable or CLI flag means "unset".
        blank_to_none(&mut self.engine_socket);
        blank_to_none(&mut self.api_version);
        blank_to_none(&mut self.connection.ssh.host);
        blank_to_none(&mut self.connection.ssh.user);
        blank_to_none(&mut self.connection.tls.host);
        Ok(())
    }
}
