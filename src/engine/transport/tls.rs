//! Mutually-authenticated TLS transport over TCP.

use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::{Transport, TransportFuture, classify_io_error, close_stream, read_stream, write_stream};
use crate::error::{DaemonError, DaemonResult};

/// Timeout applied to the TCP connect and TLS handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// File paths holding the PEM material for a TLS connection.
///
/// Without a CA bundle the platform trust store verifies the daemon. Without
/// a client certificate and key no client authentication is offered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsMaterial {
    /// PEM bundle of CA certificates trusted for the daemon.
    pub ca_cert_path: Option<Utf8PathBuf>,
    /// PEM client certificate chain.
    pub client_cert_path: Option<Utf8PathBuf>,
    /// PEM private key matching the client certificate.
    pub client_key_path: Option<Utf8PathBuf>,
}

/// Transport speaking TLS to a daemon's TCP endpoint.
pub struct TlsTransport {
    host: String,
    port: u16,
    config: Arc<ClientConfig>,
    stream: Option<Box<TlsStream<TcpStream>>>,
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl TlsTransport {
    /// Create an unconnected transport for `host:port` using `config`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, config: Arc<ClientConfig>) -> Self {
        Self {
            host: host.into(),
            port,
            config,
            stream: None,
        }
    }

    async fn establish(&self) -> DaemonResult<TlsStream<TcpStream>> {
        let endpoint = format!("{}:{}", self.host, self.port);
        let server_name = ServerName::try_from(self.host.clone()).map_err(|error| {
            DaemonError::invalid_configuration(format!("invalid TLS host '{}': {error}", self.host))
        })?;

        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|error| classify_io_error(&error, None))?;
        let connector = TlsConnector::from(Arc::clone(&self.config));
        connector
            .connect(server_name, tcp)
            .await
            .map_err(|error| DaemonError::connection(format!("TLS handshake with {endpoint} failed: {error}")))
    }
}

impl Transport for TlsTransport {
    fn connect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.stream.is_some() {
                return Ok(());
            }
            let stream = tokio::time::timeout(CONNECT_TIMEOUT, self.establish())
                .await
                .map_err(|_elapsed| {
                    DaemonError::connection(format!(
                        "timed out connecting to {}:{} after {}s",
                        self.host,
                        self.port,
                        CONNECT_TIMEOUT.as_secs()
                    ))
                })??;
            tracing::debug!(host = %self.host, port = self.port, "TLS session established");
            self.stream = Some(Box::new(stream));
            Ok(())
        })
    }

    fn send<'a>(&'a mut self, bytes: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(write_stream(self.stream.as_deref_mut(), bytes))
    }

    fn receive(&mut self, max_len: usize) -> TransportFuture<'_, Vec<u8>> {
        Box::pin(read_stream(self.stream.as_deref_mut(), max_len))
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            close_stream(self.stream.take()).await;
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Build a rustls client configuration from PEM material on disk.
///
/// # Errors
///
/// Returns `DaemonError::InvalidConfiguration` when only one half of the
/// client identity is configured, when a PEM file cannot be read, or when it
/// holds no usable certificate or key.
pub fn load_client_config(material: &TlsMaterial) -> DaemonResult<Arc<ClientConfig>> {
    let roots = load_roots(material.ca_cert_path.as_deref())?;
    let builder = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|error| DaemonError::invalid_configuration(format!("TLS setup failed: {error}")))?
        .with_root_certificates(roots);

    let config = match (&material.client_cert_path, &material.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certificates(cert_path)?;
            let key = load_private_key(key_path)?;
            builder.with_client_auth_cert(certs, key).map_err(|error| {
                DaemonError::invalid_configuration(format!("client certificate rejected: {error}"))
            })?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(DaemonError::invalid_configuration(
                "client certificate and key must be configured together",
            ));
        }
    };
    Ok(Arc::new(config))
}

fn load_roots(ca_cert_path: Option<&Utf8Path>) -> DaemonResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    if let Some(path) = ca_cert_path {
        let (added, _ignored) = roots.add_parsable_certificates(load_certificates(path)?);
        if added == 0 {
            return Err(DaemonError::invalid_configuration(format!(
                "no usable CA certificates in {path}"
            )));
        }
        return Ok(roots);
    }

    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        tracing::warn!(error = %error, "failed to load a platform trust anchor");
    }
    let (added, _ignored) = roots.add_parsable_certificates(native.certs);
    tracing::debug!(count = added, "loaded platform trust anchors");
    Ok(roots)
}

fn load_certificates(path: &Utf8Path) -> DaemonResult<Vec<CertificateDer<'static>>> {
    let contents = read_pem(path)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(contents.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| {
            DaemonError::invalid_configuration(format!("failed to parse certificates in {path}: {error}"))
        })?;
    if certs.is_empty() {
        return Err(DaemonError::invalid_configuration(format!(
            "no certificates found in {path}"
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Utf8Path) -> DaemonResult<PrivateKeyDer<'static>> {
    let contents = read_pem(path)?;
    rustls_pemfile::private_key(&mut BufReader::new(contents.as_slice()))
        .map_err(|error| {
            DaemonError::invalid_configuration(format!("failed to parse private key in {path}: {error}"))
        })?
        .ok_or_else(|| DaemonError::invalid_configuration(format!("no private key found in {path}")))
}

/// Read a PEM file through a capability handle on its parent directory.
fn read_pem(path: &Utf8Path) -> DaemonResult<Vec<u8>> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| DaemonError::invalid_configuration(format!("'{path}' does not name a file")))?;

    Dir::open_ambient_dir(parent, ambient_authority())
        .and_then(|dir| dir.read(file_name))
        .map_err(|error| DaemonError::invalid_configuration(format!("failed to read {path}: {error}")))
}
