//! SSH tunnel lifecycle management.
//!
//! An [`SshTunnel`] owns one `ssh -N -L` subprocess forwarding a local,
//! per-tunnel Unix socket to the daemon socket on a remote host. The tunnel
//! moves through [`TunnelPhase`]s: a background watcher flags unexpected
//! process exit as [`TunnelPhase::Died`], and [`SshTunnel::reconnect`]
//! re-establishes the forward with exponential backoff. Deliberate teardown
//! bumps a generation counter first so the watcher never reports it as a
//! death.

mod command;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;
use uuid::Uuid;

pub use self::command::{DEFAULT_REMOTE_SOCKET, SshTarget, agent_environment, forwarding_args, validated_remote_socket};
use crate::engine::retry::{RetryPolicy, retry_transient};
use crate::error::{DaemonError, DaemonResult};

/// Longest stretch of SSH stderr kept for diagnostics.
const MAX_STDERR_BYTES: usize = 4096;

/// How long to wait for stderr to drain after the child exits during setup.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle phase of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelPhase {
    /// Never connected.
    Idle,
    /// A connect attempt is in progress.
    Connecting,
    /// The forward is up.
    Connected,
    /// The SSH process exited without being asked to.
    Died,
    /// Torn down deliberately.
    Disconnected,
}

/// Tunables for spawning and supervising the SSH process.
#[derive(Debug, Clone)]
pub struct SshTunnelOptions {
    /// Executable to run.
    pub program: OsString,
    /// Arguments placed before the forwarding arguments, for wrapper
    /// launchers.
    pub program_args: Vec<OsString>,
    /// Directory holding the local forwarded sockets.
    pub socket_dir: PathBuf,
    /// How long to wait for the forwarded socket to appear.
    pub socket_wait_timeout: Duration,
    /// How often to check the process and socket while waiting.
    pub poll_interval: Duration,
    /// Backoff used by [`SshTunnel::reconnect`].
    pub retry: RetryPolicy,
}

impl Default for SshTunnelOptions {
    fn default() -> Self {
        Self {
            program: OsString::from("ssh"),
            program_args: Vec::new(),
            socket_dir: std::env::temp_dir(),
            socket_wait_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            retry: RetryPolicy::TUNNEL_RECONNECT,
        }
    }
}

#[derive(Debug)]
struct TunnelState {
    phase: TunnelPhase,
    kill: Option<oneshot::Sender<()>>,
    local_socket_path: Option<PathBuf>,
    generation: u64,
}

fn lock_state(state: &Mutex<TunnelState>) -> MutexGuard<'_, TunnelState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A managed SSH port-forward to a remote daemon socket.
#[derive(Debug)]
pub struct SshTunnel {
    target: SshTarget,
    options: SshTunnelOptions,
    extra_env: Vec<(String, String)>,
    state: Arc<Mutex<TunnelState>>,
    establish: tokio::sync::Mutex<()>,
}

impl SshTunnel {
    /// Create an idle tunnel to `target`.
    ///
    /// `env` is consulted once for SSH agent discovery.
    pub fn new<E>(target: SshTarget, options: SshTunnelOptions, env: &E) -> Self
    where
        E: mockable::Env + ?Sized,
    {
        let extra_env = agent_environment(env, Path::exists);
        Self {
            target,
            options,
            extra_env,
            state: Arc::new(Mutex::new(TunnelState {
                phase: TunnelPhase::Idle,
                kill: None,
                local_socket_path: None,
                generation: 0,
            })),
            establish: tokio::sync::Mutex::new(()),
        }
    }

    /// The forwarding target.
    #[must_use]
    pub const fn target(&self) -> &SshTarget {
        &self.target
    }

    /// The current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> TunnelPhase {
        lock_state(&self.state).phase
    }

    /// Whether the forward is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.phase() == TunnelPhase::Connected
    }

    /// Whether the SSH process exited unexpectedly.
    #[must_use]
    pub fn has_died(&self) -> bool {
        self.phase() == TunnelPhase::Died
    }

    /// The local forwarded socket, while one exists.
    #[must_use]
    pub fn local_socket_path(&self) -> Option<PathBuf> {
        lock_state(&self.state).local_socket_path.clone()
    }

    /// Start the forward and return the local socket path.
    ///
    /// Any existing forward is torn down first.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::SshConnectionFailed` if `ssh` cannot be spawned,
    /// exits during setup, or the socket does not appear in time.
    pub async fn connect(&self) -> DaemonResult<PathBuf> {
        let _establishing = self.establish.lock().await;
        self.connect_locked().await
    }

    /// Tear down and re-establish the forward with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::SshConnectionFailed` once every attempt failed.
    pub async fn reconnect(&self) -> DaemonResult<PathBuf> {
        let _establishing = self.establish.lock().await;
        self.reconnect_locked().await
    }

    /// Return the live socket path, connecting or reconnecting as needed.
    ///
    /// A tunnel whose process died is re-established with backoff; an idle
    /// or deliberately closed tunnel gets a single fresh connect.
    ///
    /// # Errors
    ///
    /// As for [`Self::connect`] and [`Self::reconnect`].
    pub async fn ensure_connected(&self) -> DaemonResult<PathBuf> {
        let _establishing = self.establish.lock().await;
        let (phase, socket) = {
            let state = lock_state(&self.state);
            (state.phase, state.local_socket_path.clone())
        };
        match (phase, socket) {
            (TunnelPhase::Connected, Some(path)) => Ok(path),
            (TunnelPhase::Died, _) => self.reconnect_locked().await,
            _ => self.connect_locked().await,
        }
    }

    /// Stop the SSH process and remove the local socket.
    ///
    /// Safe to call repeatedly and on a tunnel that never connected.
    pub fn disconnect(&self) {
        let (kill, socket) = {
            let mut state = lock_state(&self.state);
            state.generation = state.generation.wrapping_add(1);
            if state.phase != TunnelPhase::Idle {
                state.phase = TunnelPhase::Disconnected;
            }
            (state.kill.take(), state.local_socket_path.take())
        };

        if let Some(signal) = kill {
            tracing::info!(host = self.target.host(), "stopping SSH tunnel");
            if signal.send(()).is_err() {
                tracing::trace!("SSH tunnel watcher already finished");
            }
        }
        if let Some(path) = socket {
            remove_socket_file(&path);
        }
    }

    async fn reconnect_locked(&self) -> DaemonResult<PathBuf> {
        tracing::info!(host = self.target.host(), "re-establishing SSH tunnel");
        self.disconnect();
        let attempts = self.options.retry.max_attempts;
        retry_transient(self.options.retry, |_attempt| self.connect_locked())
            .await
            .map_err(|error| match error {
                DaemonError::SshConnectionFailed { message } => DaemonError::ssh(format!(
                    "reconnect gave up after {attempts} attempts: {message}"
                )),
                other => other,
            })
    }

    async fn connect_locked(&self) -> DaemonResult<PathBuf> {
        self.disconnect();
        let generation = {
            let mut state = lock_state(&self.state);
            state.phase = TunnelPhase::Connecting;
            state.generation
        };

        let socket = self
            .options
            .socket_dir
            .join(format!("containerbar-{}.sock", Uuid::new_v4().simple()));
        tracing::info!(
            host = self.target.host(),
            port = self.target.port(),
            remote = self.target.remote_socket_path(),
            "starting SSH tunnel"
        );

        let pending = PendingSocket::new(socket.clone());
        let mut child = self.spawn(&socket).inspect_err(|_error| self.reset_phase(generation))?;
        let stderr_log = Arc::new(Mutex::new(String::new()));
        let drain = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, Arc::clone(&stderr_log))));

        if let Err(reason) = self.wait_for_socket(&mut child, &socket).await {
            if let Err(error) = child.kill().await {
                tracing::debug!(error = %error, "SSH process already gone");
            }
            if let Some(handle) = drain
                && tokio::time::timeout(STDERR_DRAIN_TIMEOUT, handle).await.is_err()
            {
                tracing::debug!("SSH stderr did not close in time");
            }
            drop(pending);
            self.reset_phase(generation);
            let diagnostics = stderr_log.lock().unwrap_or_else(PoisonError::into_inner).trim().to_owned();
            return Err(DaemonError::ssh(if diagnostics.is_empty() {
                reason
            } else {
                format!("{reason}: {diagnostics}")
            }));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(watch_process(child, kill_rx, Arc::clone(&self.state), generation));
        let mut state = lock_state(&self.state);
        state.phase = TunnelPhase::Connected;
        state.kill = Some(kill_tx);
        state.local_socket_path = Some(pending.keep());
        drop(state);
        tracing::info!(socket = %socket.display(), "SSH tunnel established");
        Ok(socket)
    }

    fn spawn(&self, socket: &Path) -> DaemonResult<Child> {
        Command::new(&self.options.program)
            .args(&self.options.program_args)
            .args(forwarding_args(&self.target, socket))
            .envs(self.extra_env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| {
                DaemonError::ssh(format!(
                    "failed to start {}: {error}",
                    self.options.program.to_string_lossy()
                ))
            })
    }

    async fn wait_for_socket(&self, child: &mut Child, socket: &Path) -> Result<(), String> {
        let deadline = tokio::time::Instant::now() + self.options.socket_wait_timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Err(format!("ssh exited during setup ({status})")),
                Ok(None) => {}
                Err(error) => return Err(format!("failed to poll ssh process: {error}")),
            }
            if tokio::fs::try_exists(socket).await.unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(format!(
                    "timed out after {}ms waiting for forwarded socket {}",
                    self.options.socket_wait_timeout.as_millis(),
                    socket.display()
                ));
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    /// Return a failed connect attempt to `Idle` unless a newer operation
    /// has taken over.
    fn reset_phase(&self, generation: u64) {
        let mut state = lock_state(&self.state);
        if state.generation == generation && state.phase == TunnelPhase::Connecting {
            state.phase = TunnelPhase::Idle;
        }
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Wait for the SSH process to exit or for a kill request.
///
/// Exit only counts as a death if no teardown has happened since the
/// process was started.
async fn watch_process(
    mut child: Child,
    kill: oneshot::Receiver<()>,
    state: Arc<Mutex<TunnelState>>,
    generation: u64,
) {
    tokio::select! {
        status = child.wait() => {
            let mut guard = lock_state(&state);
            if guard.generation == generation && guard.phase == TunnelPhase::Connected {
                guard.phase = TunnelPhase::Died;
                drop(guard);
                match status {
                    Ok(exit) => tracing::warn!(status = %exit, "SSH tunnel process exited unexpectedly"),
                    Err(error) => tracing::warn!(error = %error, "lost track of SSH tunnel process"),
                }
            }
        }
        _signal = kill => {
            if let Err(error) = child.kill().await {
                tracing::debug!(error = %error, "SSH process already gone");
            }
        }
    }
}

/// Log SSH stderr lines and keep a bounded copy for diagnostics.
async fn drain_stderr(stderr: ChildStderr, log: Arc<Mutex<String>>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!(line = %line, "ssh");
                let mut kept = log.lock().unwrap_or_else(PoisonError::into_inner);
                if kept.len() < MAX_STDERR_BYTES {
                    if !kept.is_empty() {
                        kept.push('\n');
                    }
                    kept.push_str(&line);
                }
            }
            Ok(None) => break,
            Err(error) => {
                tracing::debug!(error = %error, "stopped reading SSH stderr");
                break;
            }
        }
    }
}

/// A forwarded socket not yet handed to the tunnel state.
///
/// Removed on drop, so an abandoned connect leaves nothing behind. The SSH
/// child itself is killed on drop.
struct PendingSocket {
    path: Option<PathBuf>,
}

impl PendingSocket {
    const fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn keep(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for PendingSocket {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            remove_socket_file(&path);
        }
    }
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(socket = %path.display(), "removed forwarded socket"),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            tracing::warn!(socket = %path.display(), error = %error, "failed to remove forwarded socket");
        }
    }
}
