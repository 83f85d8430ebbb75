//! `containerbar` command-line entry point.
//!
//! The binary is a thin consumer of the [`Fetcher`] facade. It uses `eyre`
//! for opaque error reporting at the boundary, converting domain errors into
//! human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/containerbar/config.toml` or the path
//!    from `CONTAINERBAR_CONFIG_PATH`)
//! 3. Environment variables (`CONTAINERBAR_*`)
//! 4. Command-line arguments

use clap::Parser;
use containerbar::config::{
    AppConfig, Cli, Commands, ContainerArgs, ListArgs, LogsArgs, RemoveArgs, StopArgs, load_config,
};
use containerbar::engine::{
    DaemonClient, EngineConnector, LogOptions, RemoveOptions, SocketResolver,
};
use containerbar::error::{DaemonError, Result as ContainerbarResult};
use containerbar::monitor::{FetchResult, Fetcher};
use eyre::{Report, Result as EyreResult};
use mockable::DefaultEnv;
use tracing_subscriber::EnvFilter;

/// Application entry point.
#[tokio::main]
async fn main() -> EyreResult<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;

    run(&cli, &config).await.map_err(Report::from)
}

/// Log to stderr, filtered by `RUST_LOG` with `info` as the default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Connect, dispatch the subcommand, then release the connection.
async fn run(cli: &Cli, config: &AppConfig) -> ContainerbarResult<()> {
    let env = DefaultEnv::new();
    let descriptor = config.connection_descriptor(&SocketResolver::new(&env))?;
    tracing::debug!(connection = %descriptor, "using daemon connection");
    let client = EngineConnector::client(&descriptor, config.api_version()?, &env);
    let fetcher = Fetcher::new(client, config.fetcher.settings());

    let outcome = dispatch(&cli.command, &fetcher).await;
    fetcher.api().close().await;
    outcome
}

async fn dispatch(command: &Commands, fetcher: &Fetcher<DaemonClient>) -> ContainerbarResult<()> {
    match command {
        Commands::Ps(args) => list_containers(fetcher, *args).await,
        Commands::Stats(args) => show_stats(fetcher, *args).await,
        Commands::Inspect(args) => inspect_container(fetcher.api(), args).await,
        Commands::Start(args) => {
            fetcher.start(&args.container).await?;
            report_done("started", &args.container);
            Ok(())
        }
        Commands::Stop(args) => stop_container(fetcher, args).await,
        Commands::Restart(args) => restart_container(fetcher, args).await,
        Commands::Rm(args) => remove_container(fetcher, args).await,
        Commands::Logs(args) => print_logs(fetcher.api(), args).await,
        Commands::Info => show_info(fetcher.api()).await,
        Commands::Ping => ping(fetcher).await,
    }
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn report_done(action: &str, container: &str) {
    println!("{action} {container}");
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn print_listing(result: &FetchResult) {
    println!("{:<12}  {:<24}  {:<32}  {:<10}  STATUS", "ID", "NAME", "IMAGE", "STATE");
    for container in &result.containers {
        println!(
            "{:<12}  {:<24}  {:<32}  {:<10}  {}",
            container.short_id(),
            container.display_name(),
            container.image,
            container.state.as_str(),
            container.status_text
        );
    }
}

/// List containers.
async fn list_containers(fetcher: &Fetcher<DaemonClient>, args: ListArgs) -> ContainerbarResult<()> {
    let result = fetcher.fetch(false, args.all).await?;
    print_listing(&result);
    Ok(())
}

/// Show per-container usage and host totals.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn show_stats(fetcher: &Fetcher<DaemonClient>, args: ListArgs) -> ContainerbarResult<()> {
    let result = fetcher.fetch(true, args.all).await?;
    println!("{:<24}  {:>8}  {:>12}  {:>12}  {:>6}", "NAME", "CPU %", "MEM USED", "MEM LIMIT", "MEM %");
    for container in &result.containers {
        let Some(sample) = result.stats_by_container_id.get(&container.id) else {
            continue;
        };
        println!(
            "{:<24}  {:>8.1}  {:>12}  {:>12}  {:>6.1}",
            container.display_name(),
            sample.cpu_percent,
            sample.mem_used_bytes,
            sample.mem_limit_bytes,
            sample.mem_percent
        );
    }
    let metrics = &result.metrics;
    println!(
        "running {} paused {} stopped {} total {} | cpu {:.1}% mem {:.1}% | {}",
        metrics.running_count,
        metrics.paused_count,
        metrics.stopped_count,
        metrics.total_count,
        metrics.total_cpu_percent,
        metrics.memory_percent(),
        metrics.health.as_str()
    );
    Ok(())
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn print_json<T: serde::Serialize>(value: &T) -> ContainerbarResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| DaemonError::InvalidResponse {
        message: format!("failed to render response: {e}"),
    })?;
    println!("{text}");
    Ok(())
}

async fn inspect_container(client: &DaemonClient, args: &ContainerArgs) -> ContainerbarResult<()> {
    let details = client.get_container(&args.container).await?;
    print_json(&details)
}

async fn stop_container(fetcher: &Fetcher<DaemonClient>, args: &StopArgs) -> ContainerbarResult<()> {
    fetcher.stop(&args.container, args.timeout).await?;
    report_done("stopped", &args.container);
    Ok(())
}

async fn restart_container(
    fetcher: &Fetcher<DaemonClient>,
    args: &StopArgs,
) -> ContainerbarResult<()> {
    fetcher.restart(&args.container, args.timeout).await?;
    report_done("restarted", &args.container);
    Ok(())
}

async fn remove_container(
    fetcher: &Fetcher<DaemonClient>,
    args: &RemoveArgs,
) -> ContainerbarResult<()> {
    let options = RemoveOptions {
        force: args.force,
        volumes: args.volumes,
    };
    fetcher.remove(&args.container, options).await?;
    report_done("removed", &args.container);
    Ok(())
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn print_logs(client: &DaemonClient, args: &LogsArgs) -> ContainerbarResult<()> {
    let options = LogOptions {
        tail: args.tail,
        timestamps: args.timestamps,
    };
    let logs = client.get_logs(&args.container, options).await?;
    print!("{logs}");
    Ok(())
}

async fn show_info(client: &DaemonClient) -> ContainerbarResult<()> {
    let info = client.get_system_info().await?;
    print_json(&info)
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn ping(fetcher: &Fetcher<DaemonClient>) -> ContainerbarResult<()> {
    fetcher.test_connection().await?;
    println!("ok");
    Ok(())
}
