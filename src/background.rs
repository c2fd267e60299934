//! Background worker management
//!
//! Spawns workers (and the stale-job reaper) against a job queue. Used both
//! by the standalone worker binary and by the server process when
//! `workers.enabled` is set.

use crate::config::Config;
use crate::queue::JobQueue;
use crate::workers::{create_workers, run_reaper, spawn_workers_with_config, WorkerRunnerConfig};
use crate::Result;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Start workers and the reaper. Handles run until the shutdown flag flips.
pub fn start_workers(
    config: &Config,
    pool: &PgPool,
    job_queue: Arc<dyn JobQueue>,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<tokio::task::JoinHandle<Result<()>>>> {
    // Claims are exclusive, so running several instances of each worker is
    // safe and gives per-process parallelism.
    let instances = config.workers.worker_count.max(1);
    let mut workers = Vec::new();
    for _ in 0..instances {
        workers.extend(create_workers(pool));
    }
    let worker_count = workers.len();

    let runner_config = WorkerRunnerConfig::from_config(&config.workers);
    let mut handles =
        spawn_workers_with_config(workers, job_queue.clone(), runner_config, Some(shutdown.clone()));

    let reap_interval = Duration::from_secs(config.workers.reap_interval_seconds);
    let stale_after = Duration::from_secs(config.workers.stale_job_timeout_seconds);
    handles.push(tokio::spawn(async move {
        run_reaper(job_queue, reap_interval, stale_after, Some(shutdown)).await;
        Ok(())
    }));

    tracing::info!(
        worker_count,
        "Background workers started and listening for jobs"
    );

    Ok(handles)
}
