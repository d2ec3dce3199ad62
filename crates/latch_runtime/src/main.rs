//! Latch Authority Runtime
//!
//! Boots a simulated cluster of workers and drives authority enforcement on
//! a fixed coordination tick.

mod cluster;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use cluster::Cluster;
use settings::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "latch",
    version,
    about = "Simulate load-balanced authority handover between workers"
)]
struct Cli {
    /// JSON settings file; built-in defaults when omitted
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Override the number of coordination ticks to run
    #[arg(long)]
    ticks: Option<u64>,

    /// Print the effective settings as JSON and exit
    #[arg(long)]
    print_settings: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(ticks) = cli.ticks {
        settings.coordination.ticks = ticks;
    }

    if cli.print_settings {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .context("invalid log level in settings")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Latch Authority v{}", latch_authority::VERSION);

    let mut cluster = Cluster::new(&settings)?;
    let tick_duration = settings.coordination.tick_duration();

    for _ in 0..settings.coordination.ticks {
        cluster.tick();
        if settings.coordination.realtime {
            std::thread::sleep(tick_duration);
        }
    }

    for (worker, virtual_worker, stats) in cluster.worker_stats() {
        tracing::info!(
            %worker,
            %virtual_worker,
            queued = stats.queued(),
            emitted = stats.emitted(),
            skipped = stats.skipped(),
            not_authoritative = stats.skipped_not_authoritative(),
            unresolved = stats.skipped_unresolved_worker(),
            "Enforcer summary"
        );
    }

    let report = cluster.report();
    let simulated = settings.coordination.simulated_time(report.ticks);
    if report.converged() {
        tracing::info!(
            ticks = report.ticks,
            handovers = report.handovers,
            "All entities owned by their intended worker after {:?}",
            simulated
        );
    } else {
        tracing::warn!(
            ticks = report.ticks,
            misplaced = ?report.misplaced,
            "Some entities are not owned by their intended worker"
        );
    }

    Ok(())
}
