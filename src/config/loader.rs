//! Configuration loading with layered precedence.
//!
//! Layers are composed by hand with `MergeComposer` (lowest to highest):
//! application defaults, configuration file, environment variables,
//! command-line arguments. The derive's own `load()` is not used because the
//! `Cli` owns subcommand dispatch and because Figment's environment layer
//! silently drops values it cannot parse.
//!
//! # Environment Variable Handling
//!
//! Every recognised variable is listed in a single table. String fields such
//! as `CONTAINERBAR_ENGINE_SOCKET` are always accepted. Typed fields such as
//! `CONTAINERBAR_CONNECTION_SSH_PORT` must parse, or loading fails naming the
//! variable. `CONTAINERBAR_CONNECTION_KIND` must be one of `unix`, `ssh` or
//! `tls`.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use clap::ValueEnum;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli, ConnectionKind};
use crate::error::{ConfigError, Result};

// ============================================================================
// Environment Variable Specification Table
// ============================================================================

#[derive(Clone, Copy)]
enum EnvVarType {
    /// Always accepted.
    String,
    /// One of the [`ConnectionKind`] names.
    ConnectionKind,
    U16,
    U32,
    U64,
}

struct EnvVarSpec {
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
}

const fn spec(
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
) -> EnvVarSpec {
    EnvVarSpec {
        env_var,
        path,
        var_type,
    }
}

const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    spec("CONTAINERBAR_ENGINE_SOCKET", &["engine_socket"], EnvVarType::String),
    spec("CONTAINERBAR_API_VERSION", &["api_version"], EnvVarType::String),
    // Connection
    spec(
        "CONTAINERBAR_CONNECTION_KIND",
        &["connection", "kind"],
        EnvVarType::ConnectionKind,
    ),
    spec(
        "CONTAINERBAR_CONNECTION_SSH_HOST",
        &["connection", "ssh", "host"],
        EnvVarType::String,
    ),
    spec(
        "CONTAINERBAR_CONNECTION_SSH_USER",
        &["connection", "ssh", "user"],
        EnvVarType::String,
    ),
    spec(
        "CONTAINERBAR_CONNECTION_SSH_PORT",
        &["connection", "ssh", "port"],
        EnvVarType::U16,
    ),
    spec(
        "CONTAINERBAR_CONNECTION_SSH_REMOTE_SOCKET_PATH",
        &["connection", "ssh", "remote_socket_path"],
        EnvVarType::String,
    ),
    spec(
        "CONTAINERBAR_CONNECTION_TLS_HOST",
        &["connection", "tls", "host"],
        EnvVarType::String,
    ),
    spec(
        "CONTAINERBAR_CONNECTION_TLS_PORT",
        &["connection", "tls", "port"],
        EnvVarType::U16,
    ),
    spec(
        "CONTAINERBAR_CONNECTION_TLS_CA_CERT_PATH",
        &["connection", "tls", "ca_cert_path"],
        EnvVarType::String,
    ),
    spec(
        "CONTAINERBAR_CONNECTION_TLS_CLIENT_CERT_PATH",
        &["connection", "tls", "client_cert_path"],
        EnvVarType::String,
    ),
    spec(
        "CONTAINERBAR_CONNECTION_TLS_CLIENT_KEY_PATH",
        &["connection", "tls", "client_key_path"],
        EnvVarType::String,
    ),
    // Fetcher
    spec(
        "CONTAINERBAR_FETCHER_MIN_INTERVAL_MS",
        &["fetcher", "min_interval_ms"],
        EnvVarType::U64,
    ),
    spec(
        "CONTAINERBAR_FETCHER_MAX_STATS_CONTAINERS",
        &["fetcher", "max_stats_containers"],
        EnvVarType::U64,
    ),
    spec(
        "CONTAINERBAR_FETCHER_STATS_CONCURRENCY",
        &["fetcher", "stats_concurrency"],
        EnvVarType::U64,
    ),
    spec(
        "CONTAINERBAR_FETCHER_FAILURE_THRESHOLD",
        &["fetcher", "failure_threshold"],
        EnvVarType::U32,
    ),
];

/// Names of every environment variable the loader reads.
///
/// Tests use this to clear `CONTAINERBAR_*` variables without keeping a
/// second list in sync.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|s| s.env_var).collect()
}

// ============================================================================
// Layer loading
// ============================================================================

fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;
    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;
    let value = toml::from_str::<Value>(&content).map_err(|e| ConfigError::ParseError {
        message: format!("failed to parse {path}: {e}"),
    })?;

    tracing::debug!(path = %path, "loaded configuration file");
    composer.push_file(value, Some(path.clone()));
    Ok(())
}

fn discover_config_file(cli: &Cli) -> Option<Utf8PathBuf> {
    cli.config.clone().filter(|p| p.exists()).or_else(|| {
        ConfigDiscovery::builder("containerbar")
            .env_var("CONTAINERBAR_CONFIG_PATH")
            .config_file_name("config.toml")
            .dotfile_name(".containerbar.toml")
            .build()
            .candidates()
            .into_iter()
            .filter(|p| p.exists())
            .find_map(|p| Utf8PathBuf::try_from(p).ok())
    })
}

/// Load configuration from the process environment with full precedence.
///
/// # Errors
///
/// Returns `ConfigError::ParseError` for an unreadable or malformed file,
/// `ConfigError::InvalidValue` for an environment variable that does not
/// parse as its field's type or for values [`AppConfig::validate`] rejects,
/// and `ConfigError::OrthoConfig` when the merged layers do not deserialise.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    load_config_with_env(cli, &mockable::DefaultEnv::new())
}

/// Load configuration reading environment variables through `env`.
///
/// # Errors
///
/// As [`load_config`].
pub fn load_config_with_env<E>(cli: &Cli, env: &E) -> Result<AppConfig>
where
    E: mockable::Env + ?Sized,
{
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    if let Some(ref path) = discover_config_file(cli) {
        load_config_file(path, &mut composer)?;
    }

    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;
    Ok(config)
}

fn invalid_env(spec: &EnvVarSpec, expected: &str, raw: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: spec.env_var.to_owned(),
        reason: format!("expected {expected}, got '{raw}'"),
    }
}

fn parse_env_value(spec: &EnvVarSpec, raw: String) -> Result<Value> {
    let value = match spec.var_type {
        EnvVarType::String => Value::String(raw),
        EnvVarType::ConnectionKind => {
            let kind = ConnectionKind::from_str(raw.trim(), true)
                .map_err(|_| invalid_env(spec, "one of unix, ssh, tls", &raw))?;
            serde_json::to_value(kind).map_err(|e| ConfigError::ParseError {
                message: format!("failed to serialise {}: {e}", spec.env_var),
            })?
        }
        EnvVarType::U16 => raw
            .trim()
            .parse::<u16>()
            .map(Value::from)
            .map_err(|_| invalid_env(spec, "port number (0-65535)", &raw))?,
        EnvVarType::U32 => raw
            .trim()
            .parse::<u32>()
            .map(Value::from)
            .map_err(|_| invalid_env(spec, "unsigned integer", &raw))?,
        EnvVarType::U64 => raw
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| invalid_env(spec, "unsigned integer", &raw))?,
    };
    Ok(value)
}

/// Collect every variable in [`ENV_VAR_SPECS`] that is set into one JSON
/// object, or `Null` when none are.
fn collect_env_vars<E>(env: &E) -> Result<Value>
where
    E: mockable::Env + ?Sized,
{
    let mut root = Map::new();
    for spec in ENV_VAR_SPECS {
        let Some(raw) = env.string(spec.env_var) else {
            continue;
        };
        let value = parse_env_value(spec, raw)?;
        insert_at_path(&mut root, spec.path, value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }
    current.insert(field.to_owned(), value);
}

fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();
    if let Some(ref socket) = cli.engine_socket {
        overrides.insert("engine_socket".to_owned(), Value::String(socket.clone()));
    }
    if let Some(ref version) = cli.api_version {
        overrides.insert("api_version".to_owned(), Value::String(version.clone()));
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
