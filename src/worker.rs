//! GridScope - Background Worker Entry Point
//!
//! Runs the scan and layer workers plus the stale-job reaper against the
//! shared job queue. Scale horizontally by running multiple worker
//! processes; claims are exclusive.

use anyhow::Context;
use clap::Parser;
use gridscope::{
    background, logging,
    state::{AppState, AppStateOptions, JobQueueKind},
    Config,
};
use std::path::PathBuf;
use tokio::sync::watch;

#[derive(Debug, Parser)]
#[command(name = "gridscope-worker", version, about = "GridScope background worker")]
struct Cli {
    /// Database URL
    #[arg(long)]
    database_url: Option<String>,

    /// Directory for networks and application data
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Worker instances per job family
    #[arg(long)]
    worker_count: Option<usize>,
}

impl Cli {
    fn apply_env(&self) {
        if let Some(url) = &self.database_url {
            std::env::set_var("GRIDSCOPE_DATABASE__URL", url);
        }
        if let Some(data_dir) = &self.data_dir {
            std::env::set_var("GRIDSCOPE_STORAGE__DATA_DIR", data_dir.as_os_str());
        }
        if let Some(count) = self.worker_count {
            std::env::set_var("GRIDSCOPE_WORKERS__WORKER_COUNT", count.to_string());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.apply_env();

    let mut config = Config::load().context("Failed to load configuration")?;
    config.workers.enabled = true;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _logging_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting GridScope worker"
    );

    // The server owns schema migrations; workers only connect.
    let state = AppState::new_with_options(
        config,
        AppStateOptions {
            run_migrations: false,
            eager_connect: true,
            job_queue: JobQueueKind::Postgres,
        },
    )
    .await
    .context("Failed to initialize worker state")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = background::start_workers(
        &state.config,
        &state.db_pool,
        state.job_queue.clone(),
        shutdown_rx,
    )
    .context("Failed to start background workers")?;

    shutdown_signal().await;
    tracing::info!("Shutting down workers...");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Worker exited with error"),
            Err(e) => tracing::error!(error = %e, "Worker task panicked"),
        }
    }

    tracing::info!("Worker shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).expect("Failed to install SIGTERM signal handler");
    let sigint = tokio::signal::ctrl_c();

    tokio::select! {
        _ = sigint => {
            tracing::info!("SIGINT received, starting graceful shutdown...");
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received, starting graceful shutdown...");
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
