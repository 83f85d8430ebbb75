//! Byte-stream transports to a container daemon.
//!
//! A [`Transport`] is a point-to-point connection the HTTP codec writes
//! requests to and reads responses from. Concrete transports exist for local
//! Unix sockets and mutually-authenticated TLS over TCP; SSH tunnels are
//! expressed as a [`TransportProvider`] that hands out Unix-socket transports
//! pointed at a locally-forwarded socket.

mod error_classification;
mod provider;
mod tls;
mod unix;

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DaemonError, DaemonResult};

pub(crate) use self::error_classification::classify_io_error;
pub use self::provider::{SshTunnelProvider, TlsProvider, UnixSocketProvider};
pub use self::tls::{TlsMaterial, TlsTransport, load_client_config};
pub use self::unix::UnixSocketTransport;

/// Boxed future type returned by [`Transport`] and [`TransportProvider`]
/// implementors.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = DaemonResult<T>> + Send + 'a>>;

/// Behaviour required of a daemon connection.
///
/// `disconnect` must be idempotent and safe to call on a transport that never
/// connected. `receive` returns an empty buffer once the peer has closed the
/// stream.
pub trait Transport: Send {
    /// Establish the connection, failing with a semantic error.
    fn connect(&mut self) -> TransportFuture<'_, ()>;

    /// Write all of `bytes` to the peer.
    fn send<'a>(&'a mut self, bytes: &'a [u8]) -> TransportFuture<'a, ()>;

    /// Read up to `max_len` bytes from the peer.
    fn receive(&mut self, max_len: usize) -> TransportFuture<'_, Vec<u8>>;

    /// Close the connection.
    fn disconnect(&mut self) -> TransportFuture<'_, ()>;

    /// Returns whether a live stream is held.
    fn is_connected(&self) -> bool;
}

/// Produces connected transports for one connection choice.
///
/// The daemon client asks its provider for a fresh transport whenever it has
/// none or the previous one went stale.
pub trait TransportProvider: Send + Sync {
    /// Open and connect a new transport.
    fn open(&self) -> TransportFuture<'_, Box<dyn Transport>>;

    /// Value of the `Host` header for requests over this provider.
    fn host_header(&self) -> &str;

    /// Release provider-held resources such as tunnel subprocesses.
    fn shutdown(&self);
}

/// Write `bytes` to an optional stream, failing when not connected.
pub(super) async fn write_stream<S>(stream: Option<&mut S>, bytes: &[u8]) -> DaemonResult<()>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let writer = stream.ok_or_else(|| DaemonError::connection("transport is not connected"))?;
    writer
        .write_all(bytes)
        .await
        .map_err(|error| classify_io_error(&error, None))?;
    writer
        .flush()
        .await
        .map_err(|error| classify_io_error(&error, None))
}

/// Read up to `max_len` bytes from an optional stream.
pub(super) async fn read_stream<S>(stream: Option<&mut S>, max_len: usize) -> DaemonResult<Vec<u8>>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let reader = stream.ok_or_else(|| DaemonError::connection("transport is not connected"))?;
    let mut buffer = vec![0_u8; max_len.max(1)];
    let read = reader
        .read(&mut buffer)
        .await
        .map_err(|error| classify_io_error(&error, None))?;
    buffer.truncate(read);
    Ok(buffer)
}

/// Shut down the write half of a stream, ignoring errors from a peer that
/// already went away.
pub(super) async fn close_stream<S>(stream: Option<S>)
where
    S: AsyncWrite + Unpin,
{
    if let Some(mut open) = stream
        && let Err(error) = open.shutdown().await
    {
        tracing::trace!(error = %error, "ignoring error while closing transport");
    }
}
