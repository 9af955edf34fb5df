pub mod api;
pub mod config;
pub mod supervisor;

use crate::config::{Config, EnvOverrides, Settings};
use crate::supervisor::ReservoirSupervisor;
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use cortex_core::agent::backend::MistralBackend;
use cortex_core::agent::recover;
use cortex_core::archive::MemoryArchive;
use cortex_core::reservoir::LeakyReservoir;
use cortex_core::{AgentClient, CycleOrchestrator, SensoryEncoder, TranslatorOutput};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cortex-daemon")]
#[command(about = "Perception to cognition cycle: translator agent, reservoir, cognitive agent")]
struct Cli {
    #[command(flatten)]
    env: EnvOverrides,

    /// Config file (defaults to ~/.cortex/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter
    #[arg(long, default_value = "info", global = true)]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run the reservoir heartbeat (default)
    Serve,
    /// Run a single cycle and print the report
    Cycle {
        /// What the user said or did
        #[arg(long)]
        text: String,
        /// Sensory snapshot as a JSON document
        #[arg(long, default_value = "{}")]
        snapshot: String,
    },
    /// Encode a translator reply into the 256-slot input vector
    Encode {
        /// File holding the translator reply
        input: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(p) => Config::load_from(p),
        None => Config::load(),
    };
    config.map_err(|e| anyhow!("failed to load config: {e}"))
}

/// Reservoir, agent client and orchestrator wired from the resolved settings.
fn assemble(settings: &Settings) -> anyhow::Result<(ReservoirSupervisor, Arc<AgentClient>, Arc<CycleOrchestrator>)> {
    let backend = MistralBackend::new(
        settings.api_key.clone(),
        settings.base_url.clone(),
        settings.call_timeout,
    )?;
    let agent = Arc::new(
        AgentClient::new(Arc::new(backend), settings.profiles.clone())
            .with_call_timeout(settings.call_timeout),
    );

    let supervisor = ReservoirSupervisor::boot(
        LeakyReservoir::new(settings.reservoir.seed),
        settings.reservoir.neuron_count,
        settings.reservoir.fanout,
        settings.tick_interval(),
    )?;

    let orchestrator = Arc::new(
        CycleOrchestrator::new(agent.clone(), supervisor.reservoir())
            .with_archive(MemoryArchive::new(settings.archive_capacity)),
    );
    Ok((supervisor, agent, orchestrator))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let (mut supervisor, agent, orchestrator) = assemble(&settings)?;
    supervisor.start();

    let state = api::AppState::new(agent, orchestrator, supervisor.stats(), supervisor.interval());
    let served = api::run_api_server(state, &settings.bind_addr(), shutdown_signal()).await;

    supervisor.stop().await;
    served
}

async fn one_cycle(settings: Settings, text: &str, snapshot: &str) -> anyhow::Result<()> {
    let snapshot: serde_json::Value =
        serde_json::from_str(snapshot).context("--snapshot must be a JSON document")?;
    let (_supervisor, _agent, orchestrator) = assemble(&settings)?;

    let report = orchestrator.run_cycle(text, &snapshot).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn encode_file(input: &Path) -> anyhow::Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("cannot read {}", input.display()))?;
    let value = recover::direct_then_first_brace(&text)?;
    let output = TranslatorOutput::from_value(&value);
    let vector = SensoryEncoder::new().encode(&output);

    info!(active = vector.active(), max = vector.max(), "Encoded translator reply");
    println!("{}", serde_json::to_string(&vector)?);
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let command = cli.command.unwrap_or(Commands::Serve);
    if let Commands::Encode { input } = &command {
        return encode_file(input);
    }

    let config = load_config(cli.config.as_deref())?;
    let settings = Settings::resolve(config, &cli.env)?;
    info!(settings = ?settings, "Starting cortex daemon");

    let rt = tokio::runtime::Runtime::new()?;
    match command {
        Commands::Serve => rt.block_on(serve(settings)),
        Commands::Cycle { text, snapshot } => rt.block_on(one_cycle(settings, &text, &snapshot)),
        Commands::Encode { .. } => Ok(()),
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize structured logging
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(cli) {
        error!(error = %e, "Fatal Error");
        std::process::exit(1);
    }
}
