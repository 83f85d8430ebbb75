//! Daemon endpoint resolution and client construction.
//!
//! A [`ConnectionDescriptor`] names one of the three ways to reach a daemon.
//! Local sockets are resolved through a priority-based fallback chain:
//!
//! 1. The configured socket (CLI, config file, or `CONTAINERBAR_ENGINE_SOCKET`)
//! 2. `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST` (Unix endpoints only)
//! 3. The platform default `/var/run/docker.sock`
//!
//! [`EngineConnector::client`] turns a descriptor into a [`DaemonClient`]
//! backed by the matching transport provider.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::api::{ApiVersion, DaemonClient};
use crate::engine::transport::{
    SshTunnelProvider, TlsMaterial, TlsProvider, TransportProvider, UnixSocketProvider,
};
use crate::engine::tunnel::{SshTarget, SshTunnel, SshTunnelOptions};
use crate::error::{DaemonError, DaemonResult};

/// Environment variable names checked in fallback order after configuration.
const FALLBACK_ENV_VARS: &[&str] = &["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Scheme prefix for Unix socket endpoints.
const UNIX_SCHEME: &str = "unix://";

/// Default daemon socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default port of a TLS-protected daemon.
pub const DEFAULT_TLS_PORT: u16 = 2376;

/// Extracts a filesystem path from a Unix socket endpoint.
///
/// Accepts `unix:///path` and bare absolute paths. Returns `None` for any
/// other scheme (`tcp://`, `ssh://`, `npipe://`) and for relative paths.
#[must_use]
pub fn unix_socket_path(endpoint: &str) -> Option<PathBuf> {
    let raw = endpoint.strip_prefix(UNIX_SCHEME).unwrap_or(endpoint);
    let path = Path::new(raw);
    (!raw.is_empty() && path.is_absolute()).then(|| path.to_path_buf())
}

/// Resolves daemon socket endpoints from environment variables.
///
/// # Type Parameters
///
/// * `E` - An environment provider implementing the `mockable::Env` trait,
///   allowing for testable environment variable access.
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Creates a new socket resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Resolves a socket path from the fallback environment variables.
    ///
    /// Empty values and endpoints that are not Unix sockets are skipped, so
    /// a `DOCKER_HOST=tcp://...` does not shadow a usable `PODMAN_HOST`.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<PathBuf> {
        FALLBACK_ENV_VARS.iter().find_map(|var_name| {
            let value = self.env.string(var_name).filter(|v| !v.is_empty())?;
            let path = unix_socket_path(&value);
            if path.is_none() {
                tracing::debug!(
                    variable = var_name,
                    endpoint = %value,
                    "ignoring non-Unix daemon endpoint"
                );
            }
            path
        })
    }

    /// Returns the platform default socket path.
    #[must_use]
    pub fn default_socket() -> &'static Path {
        Path::new(DEFAULT_SOCKET_PATH)
    }
}

/// How to reach a daemon. Immutable; a new connection means a new client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionDescriptor {
    /// A local Unix domain socket.
    UnixSocket {
        /// Absolute socket path.
        path: PathBuf,
    },
    /// A remote socket forwarded over an SSH tunnel.
    SshTunnel(SshTarget),
    /// A TCP endpoint protected by TLS.
    Tls {
        /// Daemon host name, also used for certificate verification.
        host: String,
        /// Daemon TCP port.
        port: u16,
        /// CA and client identity material.
        material: TlsMaterial,
    },
}

impl ConnectionDescriptor {
    /// Describe a local socket connection.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::InvalidConfiguration` when `path` is not
    /// absolute.
    pub fn unix_socket(path: impl Into<PathBuf>) -> DaemonResult<Self> {
        let socket = path.into();
        if !socket.is_absolute() {
            return Err(DaemonError::invalid_configuration(format!(
                "socket path must be absolute: {}",
                socket.display()
            )));
        }
        Ok(Self::UnixSocket { path: socket })
    }

    /// Describe an SSH-tunnelled connection.
    ///
    /// An unsafe or missing `remote_socket_path` falls back to the default
    /// remote socket.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::InvalidConfiguration` when the host or user is
    /// blank, starts with `-`, or the port is zero.
    pub fn ssh_tunnel(
        host: &str,
        user: &str,
        port: u16,
        remote_socket_path: Option<&str>,
    ) -> DaemonResult<Self> {
        let ssh_host = require_word("SSH host", host)?;
        let ssh_user = require_word("SSH user", user)?;
        if port == 0 {
            return Err(DaemonError::invalid_configuration("SSH port must be non-zero"));
        }
        Ok(Self::SshTunnel(SshTarget::new(
            ssh_host,
            ssh_user,
            port,
            remote_socket_path,
        )))
    }

    /// Describe a TLS connection.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::InvalidConfiguration` when the host is blank,
    /// the port is zero, or only half of the client identity is supplied.
    pub fn tls(host: &str, port: u16, material: TlsMaterial) -> DaemonResult<Self> {
        let tls_host = require_word("TLS host", host)?;
        if port == 0 {
            return Err(DaemonError::invalid_configuration("TLS port must be non-zero"));
        }
        if material.client_cert_path.is_some() != material.client_key_path.is_some() {
            return Err(DaemonError::invalid_configuration(
                "client certificate and key must be configured together",
            ));
        }
        Ok(Self::Tls {
            host: tls_host.to_owned(),
            port,
            material,
        })
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnixSocket { path } => write!(f, "{UNIX_SCHEME}{}", path.display()),
            Self::SshTunnel(target) => write!(
                f,
                "ssh://{}:{}{}",
                target.destination(),
                target.port(),
                target.remote_socket_path()
            ),
            Self::Tls { host, port, .. } => write!(f, "tls://{host}:{port}"),
        }
    }
}

/// Trims `value` and rejects blanks and option-like words.
fn require_word<'v>(label: &str, value: &'v str) -> DaemonResult<&'v str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DaemonError::invalid_configuration(format!(
            "{label} is required"
        )));
    }
    if trimmed.starts_with('-') {
        return Err(DaemonError::invalid_configuration(format!(
            "{label} must not start with '-': {trimmed}"
        )));
    }
    Ok(trimmed)
}

/// Builds daemon clients from connection descriptors.
pub struct EngineConnector;

impl EngineConnector {
    /// Resolves the local socket path without connecting.
    ///
    /// Resolution order:
    /// 1. `config_socket` (from CLI, config file, or `CONTAINERBAR_ENGINE_SOCKET`)
    /// 2. `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST` (via resolver)
    /// 3. Platform default socket
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::InvalidConfiguration` when an explicitly
    /// configured socket is not a Unix endpoint.
    pub fn resolve_socket<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> DaemonResult<PathBuf> {
        if let Some(configured) = config_socket.filter(|s| !s.is_empty()) {
            return unix_socket_path(configured).ok_or_else(|| {
                DaemonError::invalid_configuration(format!(
                    "engine socket must be a unix:// URL or absolute path: {configured}"
                ))
            });
        }
        Ok(resolver
            .resolve_from_env()
            .unwrap_or_else(|| SocketResolver::<E>::default_socket().to_path_buf()))
    }

    /// Builds the transport provider for `descriptor`.
    ///
    /// SSH tunnels consult `env` once for agent discovery; nothing is spawned
    /// until the first request.
    #[must_use]
    pub fn provider<E>(descriptor: &ConnectionDescriptor, env: &E) -> Box<dyn TransportProvider>
    where
        E: mockable::Env + ?Sized,
    {
        match descriptor {
            ConnectionDescriptor::UnixSocket { path } => {
                Box::new(UnixSocketProvider::new(path.clone()))
            }
            ConnectionDescriptor::SshTunnel(target) => {
                let tunnel = SshTunnel::new(target.clone(), SshTunnelOptions::default(), env);
                Box::new(SshTunnelProvider::new(Arc::new(tunnel)))
            }
            ConnectionDescriptor::Tls {
                host,
                port,
                material,
            } => Box::new(TlsProvider::new(host.clone(), *port, material.clone())),
        }
    }

    /// Builds a lazily-connecting client for `descriptor`.
    #[must_use]
    pub fn client<E>(
        descriptor: &ConnectionDescriptor,
        api_version: ApiVersion,
        env: &E,
    ) -> DaemonClient
    where
        E: mockable::Env + ?Sized,
    {
        tracing::debug!(endpoint = %descriptor, %api_version, "creating daemon client");
        DaemonClient::new(Self::provider(descriptor, env), api_version)
    }
}
