//! Semantic error types for containerbar.
//!
//! This module defines the error hierarchy for the connectivity core, following
//! the principle of using semantic error enums (via `thiserror`) for conditions
//! the caller might inspect, retry, or translate into user-facing text, while
//! reserving opaque errors (`eyre::Report`) for the application boundary.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    ///
    /// This wraps errors from the layered configuration system, including:
    /// - Configuration file parsing errors
    /// - Environment variable parsing errors
    /// - CLI argument parsing errors
    /// - Missing required fields after layer merging
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised while talking to a container daemon.
///
/// Variants map one-to-one onto the failure kinds the presentation layer
/// translates into human text, so each keeps its diagnostic detail intact.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A transport-level connect, send, or receive failure.
    #[error("failed to connect to container daemon: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The configured Unix socket does not exist.
    #[error("container daemon socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// The SSH tunnel could not be spawned, verified, or re-established.
    #[error("SSH tunnel failed: {message}")]
    SshConnectionFailed {
        /// A description of the tunnel failure, including SSH diagnostics.
        message: String,
    },

    /// The daemon rejected the credentials presented (HTTP 401).
    #[error("container daemon rejected the request as unauthorised")]
    Unauthorized,

    /// The requested resource does not exist (HTTP 404).
    #[error("not found: {message}")]
    NotFound {
        /// The daemon's explanation, or the missing resource.
        message: String,
    },

    /// The request conflicts with the current resource state (HTTP 409).
    #[error("conflict: {message}")]
    Conflict {
        /// The daemon's explanation of the conflict.
        message: String,
    },

    /// The daemon failed internally (HTTP 5xx).
    #[error("container daemon error: {message}")]
    ServerError {
        /// The response body as text.
        message: String,
    },

    /// The daemon answered with a status outside the operation's success set.
    #[error("unexpected HTTP status {code}")]
    UnexpectedStatus {
        /// The HTTP status code received.
        code: u16,
    },

    /// The response could not be framed as HTTP/1.1.
    #[error("invalid HTTP response: {message}")]
    InvalidResponse {
        /// A description of the framing problem.
        message: String,
    },

    /// A JSON payload did not match the expected shape.
    #[error("failed to decode daemon response: {message}")]
    DecodingError {
        /// The decoder's description of the mismatch.
        message: String,
    },

    /// The connection descriptor or a request argument is unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// A description of the problem.
        message: String,
    },

    /// The requested capability is not available on this platform.
    #[error("not implemented: {feature}")]
    NotImplemented {
        /// The missing feature.
        feature: String,
    },
}

impl DaemonError {
    /// Returns whether a retry with backoff could plausibly succeed.
    ///
    /// Connection, server-side, and tunnel failures are transient; everything
    /// else reflects a permanent condition that retrying will not change.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ServerError { .. }
                | Self::SshConnectionFailed { .. }
        )
    }

    /// Returns whether the error indicates a broken or stale transport.
    ///
    /// Only these failures justify tearing down and re-establishing the
    /// connection before retrying a request.
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }

    /// Builds a `ConnectionFailed` error from any displayable cause.
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Builds an `InvalidResponse` error.
    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Builds an `InvalidConfiguration` error.
    pub(crate) fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Builds an `SshConnectionFailed` error.
    pub(crate) fn ssh(message: impl Into<String>) -> Self {
        Self::SshConnectionFailed {
            message: message.into(),
        }
    }
}

/// Top-level error type for containerbar.
///
/// This enum aggregates all domain-specific errors into a single type used at
/// the library's outer surface. At the application boundary (main.rs), these
/// errors are converted to `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum ContainerbarError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred while talking to the container daemon.
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// A specialised `Result` type for containerbar operations.
pub type Result<T> = std::result::Result<T, ContainerbarError>;

/// A specialised `Result` type for daemon operations.
pub type DaemonResult<T> = std::result::Result<T, DaemonError>;
