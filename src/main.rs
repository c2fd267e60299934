//! GridScope - Web Server Entry Point
//!
//! This binary starts the HTTP server that handles API requests.
//! For background workers, use the `gridscope-worker` binary.

use anyhow::Context;
use clap::Parser;
use gridscope::{api::create_router, background, logging, state::AppState, Config};
use std::path::PathBuf;
use tokio::sync::watch;

/// Command line overrides for the environment-based configuration.
#[derive(Debug, Parser)]
#[command(name = "gridscope-server", version, about = "GridScope web server")]
struct Cli {
    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to
    #[arg(long)]
    port: Option<u16>,

    /// Directory for networks and application data
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Database URL
    #[arg(long)]
    database_url: Option<String>,

    /// Run background workers inside the server process
    #[arg(long)]
    with_workers: bool,
}

impl Cli {
    /// Flags win over environment variables by being written into the
    /// environment before configuration loads.
    fn apply_env(&self) {
        if let Some(host) = &self.host {
            std::env::set_var("GRIDSCOPE_SERVER__HOST", host);
        }
        if let Some(port) = self.port {
            std::env::set_var("GRIDSCOPE_SERVER__PORT", port.to_string());
        }
        if let Some(data_dir) = &self.data_dir {
            std::env::set_var("GRIDSCOPE_STORAGE__DATA_DIR", data_dir.as_os_str());
        }
        if let Some(url) = &self.database_url {
            std::env::set_var("GRIDSCOPE_DATABASE__URL", url);
        }
        if self.with_workers {
            std::env::set_var("GRIDSCOPE_WORKERS__ENABLED", "true");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.apply_env();

    // Load configuration first to get logging settings
    let config = Config::load().context("Failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _logging_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting GridScope");

    let addr = config
        .socket_addr()
        .context("Failed to determine socket address")?;

    let networks_dir = config.storage.networks_dir();
    std::fs::create_dir_all(&networks_dir)
        .with_context(|| format!("Failed to create networks directory {networks_dir:?}"))?;

    tracing::info!(
        listen_addr = %addr,
        networks_dir = %networks_dir.display(),
        "Configuration loaded"
    );

    // Initialize application state (pool, migrations, job queue)
    let state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;

    // Optional in-process workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if state.config.workers.enabled {
        background::start_workers(
            &state.config,
            &state.db_pool,
            state.job_queue.clone(),
            shutdown_rx,
        )
        .context("Failed to start background workers")?;
    }

    let app = create_router(state);

    tracing::info!("GridScope listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("API endpoint: http://{}/api/v1", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;

    // Run server with graceful shutdown
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let _ = shutdown_tx.send(true);

    if let Err(e) = result {
        tracing::error!(error = %e, "Server terminated unexpectedly");
        return Err(e.into());
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
/// Docker sends SIGTERM, while Ctrl+C sends SIGINT
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

/// Wait for shutdown signal (SIGINT only on non-Unix platforms)
#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
