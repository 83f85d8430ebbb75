//! Layer precedence tests for `MergeComposer` config composition.

use ortho_config::serde_json::json;
use rstest::rstest;

use crate::config::ConnectionKind;
use crate::config::tests::helpers::{
    assert_config_has_defaults, create_composer_with_defaults, create_composer_with_file_and_env,
    merge_config,
};

/// Serialised defaults must survive the trip through `MergeComposer`, since
/// `load_config` pushes exactly that as its first layer.
#[rstest]
fn serialised_defaults_round_trip() {
    let composer = create_composer_with_defaults().expect("composer creation should succeed");
    let config = merge_config(composer).expect("merge should succeed");

    assert_config_has_defaults(&config);
}

#[rstest]
fn file_overrides_defaults() {
    let mut composer = create_composer_with_defaults().expect("composer creation should succeed");
    composer.push_file(
        json!({
            "connection": {"kind": "tls", "tls": {"host": "daemon.example.com"}}
        }),
        None,
    );

    let config = merge_config(composer).expect("merge should succeed");

    assert_eq!(config.connection.kind, ConnectionKind::Tls);
    assert_eq!(config.connection.tls.host.as_deref(), Some("daemon.example.com"));
    assert_eq!(config.connection.tls.port, 2376, "sibling default should survive");
}

#[rstest]
fn env_overrides_file() {
    let composer = create_composer_with_file_and_env().expect("composer creation should succeed");
    let config = merge_config(composer).expect("merge should succeed");

    assert_eq!(config.engine_socket.as_deref(), Some("unix:///from/env.sock"));
    assert_eq!(config.api_version.as_deref(), Some("v1.40"));
    assert_eq!(config.fetcher.failure_threshold, 3);
    assert_eq!(config.fetcher.min_interval_ms, 5000);
}

#[rstest]
fn cli_overrides_env() {
    let mut composer =
        create_composer_with_file_and_env().expect("composer creation should succeed");
    composer.push_cli(json!({
        "engine_socket": "unix:///from/cli.sock",
        "api_version": "v1.44"
    }));

    let config = merge_config(composer).expect("merge should succeed");

    assert_eq!(config.engine_socket.as_deref(), Some("unix:///from/cli.sock"));
    assert_eq!(config.api_version.as_deref(), Some("v1.44"));
    assert_eq!(config.fetcher.failure_threshold, 3);
}

#[rstest]
fn nested_tables_merge_field_by_field() {
    let mut composer = create_composer_with_defaults().expect("composer creation should succeed");
    composer.push_file(
        json!({
            "connection": {"ssh": {"host": "build01", "user": "core", "port": 2222}}
        }),
        None,
    );
    composer.push_environment(json!({
        "connection": {"kind": "ssh", "ssh": {"user": "deploy"}}
    }));

    let config = merge_config(composer).expect("merge should succeed");

    assert_eq!(config.connection.kind, ConnectionKind::Ssh);
    assert_eq!(config.connection.ssh.host.as_deref(), Some("build01"));
    assert_eq!(config.connection.ssh.user.as_deref(), Some("deploy"));
    assert_eq!(config.connection.ssh.port, 2222);
}
