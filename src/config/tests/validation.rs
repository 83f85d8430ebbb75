//! Value checks and connection descriptor conversion.

use std::path::PathBuf;

use camino::Utf8PathBuf;
use mockable::MockEnv;
use rstest::rstest;

use crate::config::tests::helpers::empty_env;
use crate::config::{AppConfig, ConnectionKind};
use crate::engine::{ConnectionDescriptor, SocketResolver, SshTarget, TlsMaterial};
use crate::error::{ConfigError, ContainerbarError, DaemonError};

fn ssh_config(host: Option<&str>, user: Option<&str>) -> AppConfig {
    let mut config = AppConfig::default();
    config.connection.kind = ConnectionKind::Ssh;
    config.connection.ssh.host = host.map(str::to_owned);
    config.connection.ssh.user = user.map(str::to_owned);
    config
}

#[rstest]
fn default_config_validates() {
    assert!(AppConfig::default().validate().is_ok());
}

#[rstest]
#[case::concurrency(0, 2, "fetcher.stats_concurrency")]
#[case::threshold(10, 0, "fetcher.failure_threshold")]
fn zero_fetcher_values_are_rejected(
    #[case] concurrency: usize,
    #[case] threshold: u32,
    #[case] expected_field: &str,
) {
    let mut config = AppConfig::default();
    config.fetcher.stats_concurrency = concurrency;
    config.fetcher.failure_threshold = threshold;

    match config.validate() {
        Err(ContainerbarError::Config(ConfigError::InvalidValue { field, .. })) => {
            assert_eq!(field, expected_field);
        }
        other => panic!("expected InvalidValue, got {other:?}"),
    }
}

#[rstest]
fn malformed_api_version_is_rejected() {
    let config = AppConfig {
        api_version: Some(String::from("latest")),
        ..AppConfig::default()
    };

    match config.validate() {
        Err(ContainerbarError::Config(ConfigError::InvalidValue { field, reason })) => {
            assert_eq!(field, "api_version");
            assert!(reason.contains("latest"));
        }
        other => panic!("expected InvalidValue, got {other:?}"),
    }
}

#[rstest]
fn unix_descriptor_prefers_configured_socket(empty_env: MockEnv) {
    let config = AppConfig {
        engine_socket: Some(String::from("unix:///run/podman/podman.sock")),
        ..AppConfig::default()
    };
    let resolver = SocketResolver::new(&empty_env);

    let descriptor = config
        .connection_descriptor(&resolver)
        .expect("descriptor should build");

    assert_eq!(
        descriptor,
        ConnectionDescriptor::UnixSocket {
            path: PathBuf::from("/run/podman/podman.sock")
        }
    );
}

#[rstest]
fn unix_descriptor_falls_back_to_environment() {
    let mut env = MockEnv::new();
    env.expect_string().returning(|key| {
        (key == "PODMAN_HOST").then(|| String::from("unix:///run/user/1000/podman.sock"))
    });
    let resolver = SocketResolver::new(&env);

    let descriptor = AppConfig::default()
        .connection_descriptor(&resolver)
        .expect("descriptor should build");

    assert_eq!(descriptor.to_string(), "unix:///run/user/1000/podman.sock");
}

#[rstest]
fn ssh_descriptor_uses_ssh_section(empty_env: MockEnv) {
    let mut config = ssh_config(Some("build01"), Some("core"));
    config.connection.ssh.port = 2222;
    let resolver = SocketResolver::new(&empty_env);

    let descriptor = config
        .connection_descriptor(&resolver)
        .expect("descriptor should build");

    assert_eq!(
        descriptor,
        ConnectionDescriptor::SshTunnel(SshTarget::new("build01", "core", 2222, None))
    );
}

#[rstest]
#[case::no_host(None, Some("core"), "connection.ssh.host")]
#[case::blank_host(Some(" "), Some("core"), "connection.ssh.host")]
#[case::no_user(Some("build01"), None, "connection.ssh.user")]
fn ssh_descriptor_requires_host_and_user(
    empty_env: MockEnv,
    #[case] host: Option<&str>,
    #[case] user: Option<&str>,
    #[case] expected_field: &str,
) {
    let resolver = SocketResolver::new(&empty_env);

    match ssh_config(host, user).connection_descriptor(&resolver) {
        Err(ContainerbarError::Config(ConfigError::MissingRequired { field })) => {
            assert_eq!(field, expected_field);
        }
        other => panic!("expected MissingRequired, got {other:?}"),
    }
}

#[rstest]
fn ssh_descriptor_rejects_option_like_host(empty_env: MockEnv) {
    let resolver = SocketResolver::new(&empty_env);

    let result = ssh_config(Some("-oProxyCommand=x"), Some("core")).connection_descriptor(&resolver);

    assert!(matches!(
        result,
        Err(ContainerbarError::Daemon(DaemonError::InvalidConfiguration { .. }))
    ));
}

#[rstest]
fn tls_descriptor_carries_material(empty_env: MockEnv) {
    let mut config = AppConfig::default();
    config.connection.kind = ConnectionKind::Tls;
    config.connection.tls.host = Some(String::from("daemon.example.com"));
    config.connection.tls.ca_cert_path = Some(Utf8PathBuf::from("/etc/ca.pem"));
    let resolver = SocketResolver::new(&empty_env);

    let descriptor = config
        .connection_descriptor(&resolver)
        .expect("descriptor should build");

    assert_eq!(
        descriptor,
        ConnectionDescriptor::Tls {
            host: String::from("daemon.example.com"),
            port: 2376,
            material: TlsMaterial {
                ca_cert_path: Some(Utf8PathBuf::from("/etc/ca.pem")),
                ..TlsMaterial::default()
            },
        }
    );
}

#[rstest]
fn tls_descriptor_requires_host(empty_env: MockEnv) {
    let mut config = AppConfig::default();
    config.connection.kind = ConnectionKind::Tls;
    let resolver = SocketResolver::new(&empty_env);

    assert!(matches!(
        config.connection_descriptor(&resolver),
        Err(ContainerbarError::Config(ConfigError::MissingRequired { .. }))
    ));
}
