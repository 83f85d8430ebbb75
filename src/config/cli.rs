//! Command-line argument definitions for containerbar.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Command-line interface for containerbar.
#[derive(Debug, Parser)]
#[command(name = "containerbar")]
#[command(
    author,
    version,
    about = "Inspect and control local and remote container daemons"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Local daemon socket path or `unix://` URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,

    /// Daemon API version, such as `v1.43`.
    #[arg(long, global = true)]
    pub api_version: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List containers.
    Ps(ListArgs),

    /// Show resource usage of running containers.
    Stats(ListArgs),

    /// Show details of one container.
    Inspect(ContainerArgs),

    /// Start a container.
    Start(ContainerArgs),

    /// Stop a running container.
    Stop(StopArgs),

    /// Restart a container.
    Restart(StopArgs),

    /// Remove a container.
    Rm(RemoveArgs),

    /// Print a container's logs.
    Logs(LogsArgs),

    /// Show daemon information.
    Info,

    /// Check the daemon answers.
    Ping,
}

/// Arguments for listing subcommands.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct ListArgs {
    /// Include stopped containers.
    #[arg(long, short)]
    pub all: bool,
}

/// Arguments naming a single container.
#[derive(Debug, Args)]
pub struct ContainerArgs {
    /// Container ID or name.
    #[arg(required = true)]
    pub container: String,
}

/// Arguments for the `stop` and `restart` subcommands.
#[derive(Debug, Args)]
pub struct StopArgs {
    /// Container ID or name.
    #[arg(required = true)]
    pub container: String,

    /// Seconds to wait before killing the container.
    #[arg(long, short)]
    pub timeout: Option<u32>,
}

/// Arguments for the `rm` subcommand.
#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// Container ID or name.
    #[arg(required = true)]
    pub container: String,

    /// Kill the container first if it is running.
    #[arg(long, short)]
    pub force: bool,

    /// Remove anonymous volumes attached to the container.
    #[arg(long, short)]
    pub volumes: bool,
}

/// Arguments for the `logs` subcommand.
#[derive(Debug, Args)]
pub struct LogsArgs {
    /// Container ID or name.
    #[arg(required = true)]
    pub container: String,

    /// Only print this many trailing lines.
    #[arg(long)]
    pub tail: Option<u32>,

    /// Prefix each line with its timestamp.
    #[arg(long, short)]
    pub timestamps: bool,
}
