//! Unix domain socket transport.

use std::path::{Path, PathBuf};

#[cfg(unix)]
use tokio::net::UnixStream;

use super::{Transport, TransportFuture};
#[cfg(unix)]
use super::{classify_io_error, close_stream, read_stream, write_stream};
#[cfg(not(unix))]
use crate::error::DaemonError;

/// Transport over a local Unix domain socket.
///
/// Used directly for local daemons and, pointed at a forwarded socket, as the
/// carrier for SSH-tunnelled connections.
#[derive(Debug)]
pub struct UnixSocketTransport {
    path: PathBuf,
    #[cfg(unix)]
    stream: Option<UnixStream>,
}

impl UnixSocketTransport {
    /// Create an unconnected transport for the socket at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            #[cfg(unix)]
            stream: None,
        }
    }

    /// The socket path this transport connects to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
impl Transport for UnixSocketTransport {
    fn connect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.stream.is_some() {
                return Ok(());
            }
            let stream = UnixStream::connect(&self.path)
                .await
                .map_err(|error| classify_io_error(&error, Some(&self.path)))?;
            tracing::debug!(socket = %self.path.display(), "connected to daemon socket");
            self.stream = Some(stream);
            Ok(())
        })
    }

    fn send<'a>(&'a mut self, bytes: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(write_stream(self.stream.as_mut(), bytes))
    }

    fn receive(&mut self, max_len: usize) -> TransportFuture<'_, Vec<u8>> {
        Box::pin(read_stream(self.stream.as_mut(), max_len))
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

#[cfg(not(unix))]
impl Transport for UnixSocketTransport {
    fn connect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            Err(DaemonError::NotImplemented {
                feature: String::from("Unix domain socket transport"),
            })
        })
    }

    fn send<'a>(&'a mut self, _bytes: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(async move { Err(DaemonError::connection("transport is not connected")) })
    }

    fn receive(&mut self, _max_len: usize) -> TransportFuture<'_, Vec<u8>> {
        Box::pin(async move { Err(DaemonError::connection("transport is not connected")) })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }

    fn is_connected(&self) -> bool {
        false
    }
}
