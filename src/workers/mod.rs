//! Background workers for asynchronous processing
//!
//! Workers consume the job queue and execute the closed set of job kinds.
//! Outcomes are written back to the job record by the runner: a returned
//! value completes the job, a `JobFailure` fails it with kind + message.

mod base;
mod layers;
mod runner;
mod scan;

pub use base::{JobFailure, Worker};
pub use layers::LayerWorker;
pub use runner::{
    run_reaper, run_worker, run_worker_with_config, spawn_workers, spawn_workers_with_config,
    WorkerRunnerConfig,
};
pub use scan::ScanWorker;

use sqlx::PgPool;

/// Create all configured workers.
pub fn create_workers(pool: &PgPool) -> Vec<Box<dyn Worker>> {
    vec![
        Box::new(ScanWorker::new(pool.clone())),
        Box::new(LayerWorker::new(pool.clone())),
    ]
}
