//! Error classification helpers for daemon transport failures.
//!
//! This module converts low-level I/O errors into semantic `DaemonError`
//! variants so callers receive actionable diagnostics.

use std::path::Path;

use crate::error::DaemonError;

/// Classify an I/O error kind into a semantic `DaemonError`.
///
/// A missing socket file becomes `SocketNotFound` when the socket path is
/// known; everything else is a `ConnectionFailed` carrying the original
/// message, with permission problems naming the offending path.
fn classify_io_error_kind(
    kind: std::io::ErrorKind,
    socket_path: Option<&Path>,
    error_msg: &str,
) -> DaemonError {
    match (kind, socket_path) {
        (std::io::ErrorKind::NotFound, Some(path)) => DaemonError::SocketNotFound {
            path: path.to_path_buf(),
        },
        (std::io::ErrorKind::PermissionDenied, Some(path)) => DaemonError::ConnectionFailed {
            message: format!("permission denied accessing {}: {error_msg}", path.display()),
        },
        _ => DaemonError::ConnectionFailed {
            message: error_msg.to_owned(),
        },
    }
}

/// Classify an I/O error raised by a transport into a semantic `DaemonError`.
///
/// Errors wrapping another `io::Error` (as TLS streams do) are classified by
/// the innermost kind found in the source chain.
pub(crate) fn classify_io_error(error: &std::io::Error, socket_path: Option<&Path>) -> DaemonError {
    let kind = io_error_kind_in_chain(error).unwrap_or_else(|| error.kind());
    classify_io_error_kind(kind, socket_path, &error.to_string())
}

/// Walk the error source chain looking for an `io::Error` kind.
fn io_error_kind_in_chain(error: &dyn std::error::Error) -> Option<std::io::ErrorKind> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = error.source();
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return Some(io_err.kind());
        }
        current = err.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::path::PathBuf;

    use rstest::rstest;

    use super::{classify_io_error, io_error_kind_in_chain};
    use crate::error::DaemonError;

    #[derive(Debug)]
    struct ChainRootError {
        source: std::io::Error,
    }

    impl fmt::Display for ChainRootError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "root wrapper")
        }
    }

    impl std::error::Error for ChainRootError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.source)
        }
    }

    #[test]
    fn io_error_kind_in_chain_finds_nested_io_error_kind() {
        let error = ChainRootError {
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };

        assert_eq!(
            io_error_kind_in_chain(&error),
            Some(std::io::ErrorKind::PermissionDenied)
        );
    }

    #[rstest]
    fn missing_socket_with_known_path_is_socket_not_found() {
        let error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let path = PathBuf::from("/var/run/docker.sock");

        let classified = classify_io_error(&error, Some(&path));

        assert!(matches!(
            classified,
            DaemonError::SocketNotFound { path: ref found } if found == &path
        ));
    }

    #[rstest]
    #[case(std::io::ErrorKind::ConnectionRefused)]
    #[case(std::io::ErrorKind::BrokenPipe)]
    #[case(std::io::ErrorKind::NotFound)]
    fn errors_without_socket_path_are_connection_failures(#[case] kind: std::io::ErrorKind) {
        let error = std::io::Error::new(kind, "boom");

        let classified = classify_io_error(&error, None);

        assert!(matches!(classified, DaemonError::ConnectionFailed { .. }));
    }

    #[rstest]
    fn permission_denied_names_the_socket() {
        let error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let path = PathBuf::from("/run/podman/podman.sock");

        let classified = classify_io_error(&error, Some(&path));

        assert!(
            classified
                .to_string()
                .contains("permission denied accessing /run/podman/podman.sock"),
            "unexpected message: {classified}"
        );
    }
}
