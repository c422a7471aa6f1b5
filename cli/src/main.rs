use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::{ArgAction, Args, Parser, Subcommand};
use ephemera_cluster::{KubeClient, Kubeconfig, WaitOptions};
use ephemera_collector::{CollectorConfig, DEFAULT_COVERDIR, DEFAULT_PORT};
use ephemera_config::{Settings, parse_duration, resolve_kubeconfig_input};
use ephemera_coverage::{CoverageToolchain, GoCovdata};
use ephemera_lifecycle::{
    DEFAULT_STATE_FILE, DownRequest, FetchOptions, LifecycleConfig, Orchestrator, StepOutputs,
    UpRequest, download,
};
use miette::{IntoDiagnostic as _, Result};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};

const DEFAULT_KUBECONFIG: &str = "~/.kube/config";

#[derive(Parser)]
#[command(name = "ephemera")]
#[command(version)]
#[command(about = "Ephemeral coverage environments for CI")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv, -vvvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Session file shared by `up` and `down`.
    #[arg(long, value_name = "PATH", global = true)]
    state_file: Option<PathBuf>,

    /// Kubeconfig path or inline document.
    #[arg(long, value_name = "KUBECONFIG", global = true)]
    kubeconfig: Option<String>,

    /// Bound on apply, destroy and readiness waits (e.g. `90s`, `2m`).
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout, global = true)]
    timeout: Option<Duration>,

    /// Without a command, runs `up` when no session file exists and `down`
    /// otherwise.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Provision an access scope and deploy a collector environment.
    Up(UpArgs),
    /// Collect coverage if asked to, then destroy the recorded environment.
    Down(DownArgs),
    /// Serve merged coverage from a directory.
    Serve(ServeArgs),
    /// Fetch merged coverage from a collector into a directory.
    Download(DownloadArgs),
}

#[derive(Args, Default)]
struct UpArgs {
    /// Existing namespace to deploy into; a fresh one is created otherwise.
    #[arg(long)]
    namespace: Option<String>,
    /// API server written into the issued kubeconfig.
    #[arg(long)]
    api_server: Option<String>,
    /// Collector image tag.
    #[arg(long)]
    tag: Option<String>,
    #[arg(long, alias = "storage-class-name")]
    storage_class: Option<String>,
    #[arg(long)]
    storage_size: Option<String>,
    #[arg(long = "access-mode", alias = "pvc-access-mode", value_delimiter = ',')]
    access_modes: Vec<String>,
    #[arg(long, alias = "private-registry")]
    registry: Option<String>,
    #[arg(long)]
    image: Option<String>,
    /// Claim of a previous environment to mount read-only.
    #[arg(long, alias = "claim-name")]
    chain_claim: Option<String>,
    /// Isolate the namespace with network policies.
    #[arg(long)]
    harden: bool,
}

#[derive(Args, Default)]
struct DownArgs {
    /// Address of a cluster node exposing the collector.
    #[arg(long)]
    url: Option<String>,
    /// Where to write the text coverage report.
    #[arg(long)]
    coverfile: Option<PathBuf>,
}

#[derive(Args)]
struct ServeArgs {
    /// Directory the instrumented workload writes coverage into.
    #[arg(long)]
    coverdir: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args)]
struct DownloadArgs {
    /// Base URL of the collector.
    #[arg(long)]
    server: Option<String>,
    #[arg(long)]
    directory: PathBuf,
}

fn parse_timeout(raw: &str) -> std::result::Result<Duration, String> {
    parse_duration(raw).ok_or_else(|| format!("invalid duration {raw:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_panic_hook();
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let settings = Settings::from_env()?;

    // The collector drains in-flight requests on its own signal handling.
    if matches!(cli.command, Some(Command::Serve(_))) {
        return run(cli, settings).await;
    }
    tokio::select! {
        result = run(cli, settings) => result,
        () = shutdown_signal() => {
            tracing::warn!("interrupted, exiting without cleanup");
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().into_diagnostic()?
    } else {
        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("warn,ephemera={level},ephemera_={level}"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

/// Installs the SIGTERM/SIGINT handlers right away and resolves on the first
/// signal, so a signal sent after this returns is never lost.
fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    #[cfg(unix)]
    let signals = {
        use tokio::signal::unix::{SignalKind, signal};
        (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        )
    };
    async move {
        #[cfg(unix)]
        if let (Ok(mut sigterm), Ok(mut sigint)) = signals {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = sigint.recv() => {}
            }
            return;
        }
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let config = lifecycle_config(&cli, &settings);
    let command = match cli.command {
        Some(command) => command,
        None if config.state_file.exists() => {
            tracing::info!(state_file = %config.state_file.display(), "session found, running down");
            Command::Down(DownArgs::default())
        }
        None => {
            tracing::info!(state_file = %config.state_file.display(), "no session, running up");
            Command::Up(UpArgs::default())
        }
    };
    let kubeconfig = cli.kubeconfig.or_else(|| settings.kubeconfig.clone());

    match command {
        Command::Up(args) => up(args, &settings, kubeconfig, config).await,
        Command::Down(args) => down(args, &settings, kubeconfig, config).await,
        Command::Serve(args) => serve(args, &settings).await,
        Command::Download(args) => {
            let server = args
                .server
                .or_else(|| settings.url.clone())
                .ok_or_else(|| miette::miette!("--server is required"))?;
            download(&server, &args.directory, &config.fetch, &step_outputs(&settings)).await?;
            Ok(())
        }
    }
}

fn lifecycle_config(cli: &Cli, settings: &Settings) -> LifecycleConfig {
    let mut config = LifecycleConfig {
        state_file: cli
            .state_file
            .clone()
            .or_else(|| settings.state_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
        wait: WaitOptions::default(),
        fetch: FetchOptions::default(),
    };
    if let Some(timeout) = cli.timeout.or(settings.timeout) {
        config.wait.timeout = timeout;
    }
    if let Some(max) = settings.max_artifact_bytes {
        config.fetch.max_bytes = max;
    }
    config
}

fn step_outputs(settings: &Settings) -> StepOutputs {
    StepOutputs::new(settings.github_output.clone())
}

fn toolchain(settings: &Settings) -> Arc<dyn CoverageToolchain> {
    match &settings.go_binary {
        Some(go) => Arc::new(GoCovdata::new(go)),
        None => Arc::new(GoCovdata::default()),
    }
}

fn orchestrator(
    settings: &Settings,
    kubeconfig: Option<String>,
    config: LifecycleConfig,
) -> Result<Orchestrator> {
    let input = kubeconfig.unwrap_or_else(|| DEFAULT_KUBECONFIG.to_string());
    let kubeconfig = Kubeconfig::from_yaml(&resolve_kubeconfig_input(&input)?)?;
    let client = KubeClient::from_kubeconfig(&kubeconfig)?;
    Ok(
        Orchestrator::new(Arc::new(client), toolchain(settings), step_outputs(settings), config)
            .with_kubeconfig(kubeconfig),
    )
}

async fn up(
    args: UpArgs,
    settings: &Settings,
    kubeconfig: Option<String>,
    config: LifecycleConfig,
) -> Result<()> {
    let access_modes = if args.access_modes.is_empty() {
        settings.access_modes.clone()
    } else {
        args.access_modes
    };
    let request = UpRequest {
        namespace: args.namespace.or_else(|| settings.namespace.clone()),
        api_endpoint: args.api_server.or_else(|| settings.api_server.clone()),
        tag: args.tag.or_else(|| settings.tag.clone()),
        storage_class: args.storage_class.or_else(|| settings.storage_class.clone()),
        storage_size: args.storage_size.or_else(|| settings.storage_size.clone()),
        access_modes,
        registry: args.registry.or_else(|| settings.registry.clone()),
        image: args.image.or_else(|| settings.image.clone()),
        chain_claim: args.chain_claim.or_else(|| settings.chain_claim.clone()),
        harden: args.harden || settings.harden.unwrap_or(false),
    };
    orchestrator(settings, kubeconfig, config)?
        .up(&request)
        .await?;
    Ok(())
}

async fn down(
    args: DownArgs,
    settings: &Settings,
    kubeconfig: Option<String>,
    config: LifecycleConfig,
) -> Result<()> {
    let request = DownRequest {
        url: args.url.or_else(|| settings.url.clone()),
        coverfile: args.coverfile.or_else(|| settings.coverfile.clone()),
    };
    orchestrator(settings, kubeconfig, config)?
        .down(&request)
        .await?;
    Ok(())
}

async fn serve(args: ServeArgs, settings: &Settings) -> Result<()> {
    let config = CollectorConfig {
        coverdir: args
            .coverdir
            .or_else(|| settings.coverdir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COVERDIR)),
        listen: SocketAddr::from((
            [0, 0, 0, 0],
            args.port.or(settings.port).unwrap_or(DEFAULT_PORT),
        )),
    };
    let shutdown = shutdown_signal();
    ephemera_collector::run(&config, toolchain(settings), shutdown).await?;
    tracing::info!("collector stopped");
    Ok(())
}
