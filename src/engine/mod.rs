//! Container daemon connectivity.
//!
//! Layers, leaf first:
//!
//! - [`transport`]: byte streams over Unix sockets, TLS, and SSH tunnels
//! - [`http`]: the minimal HTTP/1.1 codec spoken over a transport
//! - [`api`]: the versioned daemon API client and payload decoding
//! - [`tunnel`]: the SSH port-forward lifecycle
//!
//! Local socket endpoints are resolved through a priority-based fallback
//! chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `CONTAINERBAR_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. `CONTAINER_HOST` environment variable
//! 6. `PODMAN_HOST` environment variable
//! 7. Platform default (`/var/run/docker.sock`)

pub mod api;
mod connection;
pub mod http;
mod retry;
pub mod transport;
pub mod tunnel;

pub use api::{
    ApiVersion, ContainerApi, ContainerRecord, ContainerState, ContainerStatsSample, DaemonClient,
    LogOptions, RemoveOptions, StateBucket,
};
pub use connection::{
    ConnectionDescriptor, DEFAULT_SOCKET_PATH, DEFAULT_SSH_PORT, DEFAULT_TLS_PORT,
    EngineConnector, SocketResolver, unix_socket_path,
};
pub use http::{HttpRequest, HttpResponse, Method};
pub use retry::{RetryPolicy, retry_transient};
pub use transport::TlsMaterial;
pub use tunnel::{SshTarget, SshTunnel, SshTunnelOptions, TunnelPhase};
