//! Defaults and TOML deserialisation tests.

use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::rstest;

use crate::config::tests::helpers::{
    app_config_from_full_toml, app_config_from_partial_toml, assert_config_has_defaults,
};
use crate::config::{AppConfig, ConnectionKind, FetcherConfig};
use crate::engine::ApiVersion;

#[rstest]
fn default_config_has_expected_values() {
    assert_config_has_defaults(&AppConfig::default());
}

#[rstest]
fn full_toml_populates_every_section(app_config_from_full_toml: AppConfig) {
    let config = app_config_from_full_toml;

    assert_eq!(
        config.engine_socket.as_deref(),
        Some("unix:///run/podman/podman.sock")
    );
    assert_eq!(config.connection.kind, ConnectionKind::Tls);
    assert_eq!(config.connection.ssh.port, 2222);
    assert_eq!(config.connection.tls.host.as_deref(), Some("daemon.example.com"));
    assert_eq!(
        config.connection.tls.client_key_path,
        Some(Utf8PathBuf::from("/etc/containerbar/key.pem"))
    );
    assert_eq!(config.fetcher.stats_concurrency, 2);
    assert_eq!(config.fetcher.failure_threshold, 3);
}

#[rstest]
fn partial_toml_keeps_nested_defaults(app_config_from_partial_toml: AppConfig) {
    let config = app_config_from_partial_toml;

    assert_eq!(config.connection.kind, ConnectionKind::Unix);
    assert_eq!(config.connection.ssh.host.as_deref(), Some("build01"));
    assert_eq!(config.connection.ssh.port, 22);
    assert_eq!(config.fetcher.max_stats_containers, 10);
}

#[rstest]
fn fetcher_settings_convert_interval_to_duration(app_config_from_full_toml: AppConfig) {
    let settings = app_config_from_full_toml.fetcher.settings();

    assert_eq!(settings.min_interval, Duration::from_secs(5));
    assert_eq!(settings.max_stats_containers, 4);
    assert_eq!(settings.stats_concurrency, 2);
    assert_eq!(settings.failure_threshold, 3);
}

#[rstest]
fn default_fetcher_settings_match_fetcher_defaults() {
    assert_eq!(
        FetcherConfig::default().settings(),
        crate::monitor::FetcherSettings::default()
    );
}

#[rstest]
#[case::unset(None, ApiVersion::DEFAULT)]
#[case::blank(Some("  "), ApiVersion::DEFAULT)]
#[case::prefixed(Some("v1.41"), ApiVersion::new(1, 41))]
#[case::bare(Some("1.44"), ApiVersion::new(1, 44))]
fn api_version_falls_back_to_default(#[case] raw: Option<&str>, #[case] expected: ApiVersion) {
    let config = AppConfig {
        api_version: raw.map(str::to_owned),
        ..AppConfig::default()
    };

    assert_eq!(config.api_version().expect("version should parse"), expected);
}

#[rstest]
#[case::unknown_kind("[connection]\nkind = \"tcp\"")]
#[case::port_out_of_range("[connection.ssh]\nport = 70000")]
fn toml_rejects_unusable_values(#[case] toml: &str) {
    assert!(toml::from_str::<AppConfig>(toml).is_err());
}
