//! Transport providers, one per connection choice.

use std::path::PathBuf;
use std::sync::Arc;

use rustls::ClientConfig;
use tokio::sync::OnceCell;

use super::{TlsMaterial, TlsTransport, Transport, TransportFuture, TransportProvider, UnixSocketTransport};
use super::tls::load_client_config;
use crate::engine::tunnel::SshTunnel;

/// `Host` header value for socket-based connections.
const LOCAL_HOST_HEADER: &str = "localhost";

/// Opens transports to a local Unix socket.
#[derive(Debug, Clone)]
pub struct UnixSocketProvider {
    path: PathBuf,
}

impl UnixSocketProvider {
    /// Create a provider for the socket at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TransportProvider for UnixSocketProvider {
    fn open(&self) -> TransportFuture<'_, Box<dyn Transport>> {
        Box::pin(async move {
            let mut transport = UnixSocketTransport::new(self.path.clone());
            transport.connect().await?;
            Ok(Box::new(transport) as Box<dyn Transport>)
        })
    }

    fn host_header(&self) -> &str {
        LOCAL_HOST_HEADER
    }

    fn shutdown(&self) {}
}

/// Opens TLS transports to a remote daemon.
///
/// The rustls configuration is built on first use and shared by every
/// transport the provider opens afterwards.
#[derive(Debug)]
pub struct TlsProvider {
    host: String,
    port: u16,
    material: TlsMaterial,
    config: OnceCell<Arc<ClientConfig>>,
}

impl TlsProvider {
    /// Create a provider for `host:port` authenticated with `material`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, material: TlsMaterial) -> Self {
        Self {
            host: host.into(),
            port,
            material,
            config: OnceCell::new(),
        }
    }
}

impl TransportProvider for TlsProvider {
    fn open(&self) -> TransportFuture<'_, Box<dyn Transport>> {
        Box::pin(async move {
            let config = self
                .config
                .get_or_try_init(|| async { load_client_config(&self.material) })
                .await?;
            let mut transport = TlsTransport::new(self.host.clone(), self.port, Arc::clone(config));
            transport.connect().await?;
            Ok(Box::new(transport) as Box<dyn Transport>)
        })
    }

    fn host_header(&self) -> &str {
        &self.host
    }

    fn shutdown(&self) {}
}

/// Opens Unix-socket transports through a managed SSH tunnel.
///
/// Each open makes sure the tunnel is up, re-establishing it with backoff
/// when the SSH process has died, then connects to the forwarded socket.
#[derive(Debug, Clone)]
pub struct SshTunnelProvider {
    tunnel: Arc<SshTunnel>,
}

impl SshTunnelProvider {
    /// Create a provider backed by `tunnel`.
    #[must_use]
    pub const fn new(tunnel: Arc<SshTunnel>) -> Self {
        Self { tunnel }
    }

    /// The tunnel this provider manages.
    #[must_use]
    pub fn tunnel(&self) -> &SshTunnel {
        &self.tunnel
    }
}

impl TransportProvider for SshTunnelProvider {
    fn open(&self) -> TransportFuture<'_, Box<dyn Transport>> {
        Box::pin(async move {
            let socket = self.tunnel.ensure_connected().await?;
            let mut transport = UnixSocketTransport::new(socket);
            transport.connect().await?;
            Ok(Box::new(transport) as Box<dyn Transport>)
        })
    }

    fn host_header(&self) -> &str {
        LOCAL_HOST_HEADER
    }

    fn shutdown(&self) {
        self.tunnel.disconnect();
    }
}
