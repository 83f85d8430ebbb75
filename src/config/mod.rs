//! Configuration system for containerbar.
//!
//! Values are layered with `ortho_config`: defaults, then a configuration
//! file, then `CONTAINERBAR_*` environment variables, then command-line
//! flags. The file is looked up at `~/.config/containerbar/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! api_version = "v1.43"
//!
//! [connection]
//! kind = "ssh"
//!
//! [connection.ssh]
//! host = "build01.example.com"
//! user = "core"
//! port = 22
//! remote_socket_path = "/run/podman/podman.sock"
//!
//! [fetcher]
//! min_interval_ms = 2000
//! max_stats_containers = 10
//! failure_threshold = 2
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, ContainerArgs, ListArgs, LogsArgs, RemoveArgs, StopArgs};
pub use loader::{env_var_names, load_config, load_config_with_env};
pub use types::{AppConfig, ConnectionConfig, ConnectionKind, FetcherConfig, SshConfig, TlsConfig};
