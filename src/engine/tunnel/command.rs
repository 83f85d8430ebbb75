//! Construction of the SSH port-forwarding command line and environment.

use std::path::{Component, Path, PathBuf};

use mockable::Env;

/// Remote socket used when the configured path is unusable.
pub const DEFAULT_REMOTE_SOCKET: &str = "/var/run/docker.sock";

/// Agent socket locations probed under `XDG_RUNTIME_DIR`, in order.
const AGENT_SOCKET_CANDIDATES: [&str; 3] = ["ssh-agent.socket", "gcr/ssh", "keyring/ssh"];

/// Where the tunnel should connect and which socket it forwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    host: String,
    user: String,
    port: u16,
    remote_socket_path: String,
}

impl SshTarget {
    /// Create a target, substituting the default remote socket when
    /// `remote_socket_path` is unsafe or absent.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        port: u16,
        remote_socket_path: Option<&str>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port,
            remote_socket_path: validated_remote_socket(remote_socket_path),
        }
    }

    /// The SSH host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The SSH login user.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The SSH port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The validated daemon socket path on the remote host.
    #[must_use]
    pub fn remote_socket_path(&self) -> &str {
        &self.remote_socket_path
    }

    /// `user@host` destination argument.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Accept a remote socket path only if it is absolute, free of NUL bytes and
/// free of `..` segments.
#[must_use]
pub fn validated_remote_socket(candidate: Option<&str>) -> String {
    let Some(path) = candidate.map(str::trim).filter(|path| !path.is_empty()) else {
        return String::from(DEFAULT_REMOTE_SOCKET);
    };
    let parsed = Path::new(path);
    let safe = parsed.is_absolute()
        && !path.contains('\0')
        && !parsed
            .components()
            .any(|component| matches!(component, Component::ParentDir));
    if safe {
        path.to_owned()
    } else {
        tracing::warn!(path, "rejecting unsafe remote socket path, using default");
        String::from(DEFAULT_REMOTE_SOCKET)
    }
}

/// Arguments passed to `ssh` to forward `local_socket` to the target's
/// remote socket.
#[must_use]
pub fn forwarding_args(target: &SshTarget, local_socket: &Path) -> Vec<String> {
    let mut args: Vec<String> = ["-N", "-T"].into_iter().map(String::from).collect();
    for option in [
        "BatchMode=yes",
        "StrictHostKeyChecking=accept-new",
        "ConnectTimeout=10",
        "ServerAliveInterval=15",
        "ServerAliveCountMax=3",
        "ExitOnForwardFailure=yes",
        "StreamLocalBindUnlink=yes",
    ] {
        args.push(String::from("-o"));
        args.push(String::from(option));
    }
    args.push(String::from("-p"));
    args.push(target.port().to_string());
    args.push(String::from("-L"));
    args.push(format!(
        "{}:{}",
        local_socket.display(),
        target.remote_socket_path()
    ));
    args.push(target.destination());
    args
}

/// Extra environment variables for the SSH child.
///
/// When no `SSH_AUTH_SOCK` is inherited, the first agent socket found under
/// `XDG_RUNTIME_DIR` is exported so key-based authentication works from
/// sessions that did not start an agent themselves.
pub fn agent_environment<E, F>(env: &E, exists: F) -> Vec<(String, String)>
where
    E: Env + ?Sized,
    F: Fn(&Path) -> bool,
{
    if env
        .string("SSH_AUTH_SOCK")
        .is_some_and(|value| !value.is_empty())
    {
        return Vec::new();
    }
    let Some(runtime_dir) = env
        .string("XDG_RUNTIME_DIR")
        .filter(|value| !value.is_empty())
    else {
        return Vec::new();
    };

    AGENT_SOCKET_CANDIDATES
        .iter()
        .map(|candidate| PathBuf::from(&runtime_dir).join(candidate))
        .find(|path| exists(path))
        .map(|path| {
            tracing::debug!(agent = %path.display(), "exporting discovered SSH agent socket");
            vec![(String::from("SSH_AUTH_SOCK"), path.display().to_string())]
        })
        .unwrap_or_default()
}
