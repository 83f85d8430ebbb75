//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use mockable::MockEnv;
use ortho_config::MergeComposer;
use rstest::fixture;

use crate::config::{AppConfig, ConnectionKind};
use crate::engine::{DEFAULT_SSH_PORT, DEFAULT_TLS_PORT};

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///run/podman/podman.sock"
        api_version = "v1.41"

        [connection]
        kind = "tls"

        [connection.ssh]
        host = "build01"
        user = "core"
        port = 2222
        remote_socket_path = "/run/podman/podman.sock"

        [connection.tls]
        host = "daemon.example.com"
        port = 2377
        ca_cert_path = "/etc/containerbar/ca.pem"
        client_cert_path = "/etc/containerbar/cert.pem"
        client_key_path = "/etc/containerbar/key.pem"

        [fetcher]
        min_interval_ms = 5000
        max_stats_containers = 4
        stats_concurrency = 2
        failure_threshold = 3
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///tmp/docker.sock"

        [connection.ssh]
        host = "build01"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an environment with no variables set.
#[fixture]
pub fn empty_env() -> MockEnv {
    let mut env = MockEnv::new();
    env.expect_string().returning(|_| None);
    env
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(config.engine_socket.is_none(), "engine_socket should be None");
    assert!(config.api_version.is_none(), "api_version should be None");
    assert_eq!(config.connection.kind, ConnectionKind::Unix);
    assert!(config.connection.ssh.host.is_none());
    assert_eq!(config.connection.ssh.port, DEFAULT_SSH_PORT);
    assert_eq!(config.connection.tls.port, DEFAULT_TLS_PORT);
    assert_eq!(config.fetcher.min_interval_ms, 2_000);
    assert_eq!(config.fetcher.max_stats_containers, 10);
    assert_eq!(config.fetcher.stats_concurrency, 10);
    assert_eq!(config.fetcher.failure_threshold, 2);
}

/// Helper: Creates a `MergeComposer` with defaults, file and env layers for
/// precedence tests.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;
    composer.push_file(
        json!({
            "engine_socket": "unix:///from/file.sock",
            "api_version": "v1.40",
            "fetcher": {"min_interval_ms": 5000, "failure_threshold": 4}
        }),
        None,
    );
    composer.push_environment(json!({
        "engine_socket": "unix:///from/env.sock",
        "fetcher": {"failure_threshold": 3}
    }));
    Ok(composer)
}
