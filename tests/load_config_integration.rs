//! Integration tests for the `load_config()` public API.
//!
//! These run against the real process environment, so each test clears the
//! `CONTAINERBAR_*` variables first and is marked `#[serial]`.


use std::io::Write;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use containerbar::config::{Cli, Commands, ConnectionKind, ListArgs, load_config};
use containerbar::engine::{
    ApiVersion, ConnectionDescriptor, DEFAULT_SOCKET_PATH, SocketResolver,
};
use mockable::MockEnv;
use serial_test::serial;
use tempfile::NamedTempFile;
use test_utils::{clear_containerbar_env, set_env_var};

/// Uses the `ps` subcommand as it needs no further arguments.
fn cli_with_config(config_path: Option<Utf8PathBuf>) -> Cli {
    Cli {
        command: Commands::Ps(ListArgs::default()),
        config: config_path,
        engine_socket: None,
        api_version: None,
    }
}

fn temp_config_file(content: &str) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    Ok(file)
}

fn utf8_path(file: &NamedTempFile) -> Utf8PathBuf {
    Utf8PathBuf::try_from(file.path().to_path_buf()).expect("path should be valid UTF-8")
}

#[test]
#[serial]
fn load_config_returns_defaults_when_no_sources_provided() {
    let _guard = clear_containerbar_env();

    let config = load_config(&cli_with_config(None)).expect("defaults should load");

    assert!(config.engine_socket.is_none());
    assert_eq!(config.connection.kind, ConnectionKind::Unix);
    assert_eq!(config.fetcher.failure_threshold, 2);
    assert_eq!(config.api_version().expect("default version"), ApiVersion::DEFAULT);
}

#[test]
#[serial]
fn load_config_loads_from_config_file() {
    let _guard = clear_containerbar_env();
    let file = temp_config_file(
        r#"
        api_version = "v1.41"

        [connection]
        kind = "ssh"

        [connection.ssh]
        host = "build01"
        user = "core"
        "#,
    )
    .expect("failed to create temp config");

    let config = load_config(&cli_with_config(Some(utf8_path(&file)))).expect("file should load");

    assert_eq!(config.connection.kind, ConnectionKind::Ssh);
    assert_eq!(config.connection.ssh.host.as_deref(), Some("build01"));
    assert_eq!(config.connection.ssh.port, 22);
    assert_eq!(config.api_version().expect("version"), ApiVersion::new(1, 41));
}

#[test]
#[serial]
fn environment_overrides_file_and_cli_overrides_environment() {
    let guard = clear_containerbar_env();
    let file = temp_config_file(
        r#"
        engine_socket = "unix:///from/file.sock"
        api_version = "v1.40"

        [fetcher]
        min_interval_ms = 5000
        "#,
    )
    .expect("failed to create temp config");
    set_env_var(&guard, "CONTAINERBAR_ENGINE_SOCKET", "unix:///from/env.sock");
    set_env_var(&guard, "CONTAINERBAR_API_VERSION", "v1.42");
    set_env_var(&guard, "CONTAINERBAR_FETCHER_MIN_INTERVAL_MS", "750");

    let cli = Cli {
        api_version: Some(String::from("v1.44")),
        ..cli_with_config(Some(utf8_path(&file)))
    };
    let config = load_config(&cli).expect("layers should load");

    assert_eq!(config.engine_socket.as_deref(), Some("unix:///from/env.sock"));
    assert_eq!(config.api_version.as_deref(), Some("v1.44"));
    assert_eq!(config.fetcher.min_interval_ms, 750);
}

#[test]
#[serial]
fn load_config_handles_missing_config_file_gracefully() {
    let _guard = clear_containerbar_env();

    let cli = cli_with_config(Some(Utf8PathBuf::from("/nonexistent/config.toml")));
    let config = load_config(&cli).expect("missing file should fall back to defaults");

    assert!(config.engine_socket.is_none());
}

#[test]
#[serial]
fn load_config_rejects_malformed_config_file() {
    let _guard = clear_containerbar_env();
    let file = temp_config_file("this is not valid TOML {{{").expect("failed to create temp config");

    let result = load_config(&cli_with_config(Some(utf8_path(&file))));

    assert!(result.is_err(), "malformed TOML should fail");
}

#[test]
#[serial]
fn load_config_fails_on_invalid_port_env_var() {
    let guard = clear_containerbar_env();
    set_env_var(&guard, "CONTAINERBAR_CONNECTION_SSH_PORT", "not-a-port");

    let err = load_config(&cli_with_config(None)).expect_err("invalid port should fail");
    let message = err.to_string();

    assert!(
        message.contains("CONTAINERBAR_CONNECTION_SSH_PORT"),
        "error should mention the env var: {message}"
    );
    assert!(
        message.contains("not-a-port"),
        "error should quote the value: {message}"
    );
}

#[test]
#[serial]
fn load_config_rejects_zero_failure_threshold() {
    let guard = clear_containerbar_env();
    set_env_var(&guard, "CONTAINERBAR_FETCHER_FAILURE_THRESHOLD", "0");

    let err = load_config(&cli_with_config(None)).expect_err("zero threshold should fail");

    assert!(err.to_string().contains("fetcher.failure_threshold"));
}

#[test]
#[serial]
fn blank_engine_socket_falls_back_to_default_socket() {
    let guard = clear_containerbar_env();
    set_env_var(&guard, "CONTAINERBAR_ENGINE_SOCKET", "   ");
    let mut env = MockEnv::new();
    env.expect_string().returning(|_| None);

    let config = load_config(&cli_with_config(None)).expect("blank socket should load");
    let descriptor = config
        .connection_descriptor(&SocketResolver::new(&env))
        .expect("descriptor should build");

    assert_eq!(
        descriptor,
        ConnectionDescriptor::UnixSocket {
            path: PathBuf::from(DEFAULT_SOCKET_PATH)
        }
    );
}
