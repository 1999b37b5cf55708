//! gridshiftd — the gridshift daemon.
//!
//! Assembles the scheduling hierarchy from `gridshift.toml` and drives it
//! on a simulated clock:
//! - Synthetic energy source (time-of-day price and carbon cycle)
//! - In-process reservation provider
//! - Global scheduler, regional coordinators, local executors
//! - Simulation loop with random job arrivals
//!
//! # Usage
//!
//! ```text
//! gridshiftd run --config gridshift.toml --ticks 96
//! gridshiftd topology
//! ```

mod simulation;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridshift_core::{EnergySource, GridConfig, SyntheticEnergySource};
use gridshift_reservation::SimulatedReservationClient;
use gridshift_scheduler::GlobalScheduler;

use crate::simulation::Simulation;

const DEFAULT_FILTER: &str = "info,gridshiftd=debug,gridshift=debug";

#[derive(Parser)]
#[command(name = "gridshiftd", about = "gridshift scheduling daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler against a simulated grid.
    Run {
        /// Path to gridshift.toml; built-in defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop after this many ticks.
        #[arg(long)]
        ticks: Option<u64>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML.
    Topology {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            ticks,
            json,
        } => {
            init_tracing(json);
            run(config.as_deref(), ticks).await
        }
        Command::Topology { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GridConfig> {
    match path {
        Some(path) => GridConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(GridConfig::default()),
    }
}

async fn run(config_path: Option<&Path>, ticks: Option<u64>) -> anyhow::Result<()> {
    info!("gridshift daemon starting");

    let config = load_config(config_path)?;
    info!(
        regions = config.regions.len(),
        threshold = config.scheduler.cost_threshold,
        "configuration loaded"
    );

    // ── Collaborators ──────────────────────────────────────────

    let energy: Arc<dyn EnergySource> = match config.simulation.seed {
        Some(seed) => Arc::new(SyntheticEnergySource::with_seed(seed)),
        None => Arc::new(SyntheticEnergySource::new()),
    };
    let provider = Arc::new(SimulatedReservationClient::new("provider-gridflex-001"));

    let scheduler = GlobalScheduler::from_config(&config, energy, provider)
        .context("building scheduling hierarchy")?;
    let mut sim = Simulation::new(scheduler, &config.simulation, Utc::now());

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    sim.run(
        Duration::from_millis(config.simulation.tick_interval_ms),
        ticks,
        shutdown_rx,
    )
    .await;

    let status = sim.scheduler().get_status();
    println!("{}", serde_json::to_string_pretty(&status)?);

    info!(ticks = sim.ticks(), "gridshift daemon stopped");
    Ok(())
}
