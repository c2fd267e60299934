//! Worker runner that executes workers against the job queue

use super::base::Worker;
use crate::queue::JobQueue;
use crate::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::{
    sync::watch,
    time::{sleep, Duration},
};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct WorkerRunnerConfig {
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub reconnect_jitter_ratio: f64,
}

impl WorkerRunnerConfig {
    pub fn from_config(config: &crate::config::WorkersConfig) -> Self {
        Self {
            reconnect_initial: Duration::from_secs(config.reconnect_initial_seconds),
            reconnect_max: Duration::from_secs(config.reconnect_max_seconds),
            reconnect_jitter_ratio: config.reconnect_jitter_ratio,
        }
    }
}

impl Default for WorkerRunnerConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            reconnect_jitter_ratio: 0.2,
        }
    }
}

fn jittered_duration(base: Duration, jitter_ratio: f64) -> Duration {
    if base.is_zero() || jitter_ratio <= 0.0 {
        return base;
    }

    // Deterministic-enough jitter source without adding a new RNG dependency.
    let bytes = *Uuid::new_v4().as_bytes();
    let value = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
    let unit = (value as f64) / (u64::MAX as f64); // [0,1]
    let signed = unit * 2.0 - 1.0; // [-1,1]
    let factor = (1.0 + signed * jitter_ratio).max(0.0);
    base.mul_f64(factor)
}

/// Execute one claimed job and write its terminal state back to the queue.
async fn execute_job(
    worker: &dyn Worker,
    job_queue: &Arc<dyn JobQueue>,
    job: crate::queue::Job,
) {
    tracing::info!(job_id = %job.id, job_type = %job.job_type, "{} received job", worker.name());

    match worker.process_job(&job).await {
        Ok(result) => {
            if let Err(e) = job_queue.complete(job.id, result).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to record job success");
            } else {
                tracing::info!(job_id = %job.id, "{} completed job", worker.name());
            }
        }
        Err(failure) => {
            tracing::warn!(
                job_id = %job.id,
                kind = %failure.kind,
                "{} job failed: {}",
                worker.name(),
                failure.message
            );
            if let Err(e) = job_queue.fail(job.id, &failure.kind, &failure.message).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
            }
        }
    }
}

/// Run a worker by listening to the job queue and processing jobs
pub async fn run_worker(worker: Arc<dyn Worker>, job_queue: Arc<dyn JobQueue>) -> Result<()> {
    run_worker_with_config(worker, job_queue, WorkerRunnerConfig::default(), None).await
}

pub async fn run_worker_with_config(
    worker: Arc<dyn Worker>,
    job_queue: Arc<dyn JobQueue>,
    runner_config: WorkerRunnerConfig,
    mut shutdown: Option<watch::Receiver<bool>>,
) -> Result<()> {
    let job_types: Vec<String> = worker
        .supported_job_types()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let worker_id = format!("{}-{}", worker.name(), Uuid::new_v4());

    tracing::info!(
        worker_id = %worker_id,
        "{} listening for job types: {:?}",
        worker.name(),
        job_types
    );

    let mut reconnect_delay = runner_config.reconnect_initial;

    loop {
        if let Some(rx) = shutdown.as_ref() {
            if *rx.borrow() {
                tracing::info!("{} shutdown requested, stopping", worker.name());
                return Ok(());
            }
        }

        // (Re)create the job stream. LISTEN/NOTIFY connections can drop; when
        // that happens the stream ends and the listener is re-established.
        let mut job_stream = match job_queue.listen(&job_types, &worker_id).await {
            Ok(stream) => {
                reconnect_delay = runner_config.reconnect_initial;
                stream
            }
            Err(e) => {
                tracing::error!(
                    "{} failed to create job listener: {} (reconnecting in {:?})",
                    worker.name(),
                    e,
                    reconnect_delay
                );
                let sleep_for =
                    jittered_duration(reconnect_delay, runner_config.reconnect_jitter_ratio);
                sleep(sleep_for).await;
                reconnect_delay = (reconnect_delay * 2).min(runner_config.reconnect_max);
                continue;
            }
        };

        loop {
            tokio::select! {
                _ = async {
                    if let Some(rx) = shutdown.as_mut() {
                        let _ = rx.changed().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                } => {
                    if let Some(rx) = shutdown.as_ref() {
                        if *rx.borrow() {
                            tracing::info!("{} shutdown requested, stopping", worker.name());
                            return Ok(());
                        }
                    }
                }
                next = job_stream.next() => {
                    match next {
                        Some(Ok(job)) => execute_job(worker.as_ref(), &job_queue, job).await,
                        Some(Err(e)) => {
                            tracing::error!("{} error receiving job: {}", worker.name(), e);
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::warn!(
            "{} job stream ended (connection lost?), reconnecting in {:?}",
            worker.name(),
            reconnect_delay
        );
        let sleep_for = jittered_duration(reconnect_delay, runner_config.reconnect_jitter_ratio);
        sleep(sleep_for).await;
        reconnect_delay = (reconnect_delay * 2).min(runner_config.reconnect_max);
    }
}

/// Spawn multiple workers
pub fn spawn_workers(
    workers: Vec<Box<dyn Worker>>,
    job_queue: Arc<dyn JobQueue>,
) -> Vec<tokio::task::JoinHandle<Result<()>>> {
    spawn_workers_with_config(workers, job_queue, WorkerRunnerConfig::default(), None)
}

pub fn spawn_workers_with_config(
    workers: Vec<Box<dyn Worker>>,
    job_queue: Arc<dyn JobQueue>,
    runner_config: WorkerRunnerConfig,
    shutdown: Option<watch::Receiver<bool>>,
) -> Vec<tokio::task::JoinHandle<Result<()>>> {
    workers
        .into_iter()
        .map(|worker| {
            let worker_arc: Arc<dyn Worker> = Arc::from(worker);
            let queue = job_queue.clone();
            let cfg = runner_config.clone();
            let shutdown_rx = shutdown.clone();
            tokio::spawn(async move {
                run_worker_with_config(worker_arc, queue, cfg, shutdown_rx).await
            })
        })
        .collect()
}

/// Periodically fail `running` jobs abandoned by dead workers. Runs until the
/// shutdown flag flips.
pub async fn run_reaper(
    job_queue: Arc<dyn JobQueue>,
    interval: Duration,
    older_than: Duration,
    mut shutdown: Option<watch::Receiver<bool>>,
) {
    loop {
        match job_queue.reap_stale(older_than).await {
            Ok(0) => {}
            Ok(reaped) => tracing::warn!(reaped, "Reaped stale running jobs"),
            Err(e) => tracing::error!(error = %e, "Job reaper sweep failed"),
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = async {
                if let Some(rx) = shutdown.as_mut() {
                    let _ = rx.changed().await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {
                if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                    tracing::info!("Job reaper shutdown requested, stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{InlineJobQueue, Job, JobKind, JobStatus};
    use crate::workers::JobFailure;
    use async_trait::async_trait;

    struct FlakyWorker;

    #[async_trait]
    impl Worker for FlakyWorker {
        fn name(&self) -> &'static str {
            "FlakyWorker"
        }

        fn supported_job_types(&self) -> &[&'static str] {
            &["scan_networks"]
        }

        async fn process_job(
            &self,
            job: &Job,
        ) -> std::result::Result<serde_json::Value, JobFailure> {
            match job.kind() {
                Ok(JobKind::ScanNetworks { networks_path }) if networks_path == "/ok" => {
                    Ok(serde_json::json!({"scanned": 1}))
                }
                _ => Err(JobFailure::io("cannot read path")),
            }
        }
    }

    #[tokio::test]
    async fn execute_job_records_success_and_failure() {
        let queue: Arc<dyn JobQueue> = Arc::new(InlineJobQueue::new());
        let worker = FlakyWorker;

        let good = queue
            .enqueue(JobKind::ScanNetworks {
                networks_path: "/ok".into(),
            })
            .await
            .unwrap();
        let bad = queue
            .enqueue(JobKind::ScanNetworks {
                networks_path: "/missing".into(),
            })
            .await
            .unwrap();

        let types = vec!["scan_networks".to_string()];
        while let Some(job) = queue.try_claim(&types, "test-worker").await.unwrap() {
            execute_job(&worker, &queue, job).await;
        }

        let good_job = queue.job(good.job_id).await.unwrap().unwrap();
        assert_eq!(good_job.status, JobStatus::Succeeded);
        assert_eq!(good_job.result.as_ref().unwrap()["scanned"], 1);

        let bad_job = queue.job(bad.job_id).await.unwrap().unwrap();
        assert_eq!(bad_job.status, JobStatus::Failed);
        assert_eq!(bad_job.error_kind.as_deref(), Some("io"));
        assert!(bad_job.result.is_none());
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let base = Duration::from_secs(10);
        for _ in 0..100 {
            let jittered = jittered_duration(base, 0.2);
            assert!(jittered >= Duration::from_secs(8));
            assert!(jittered <= Duration::from_secs(12));
        }
        assert_eq!(jittered_duration(base, 0.0), base);
    }
}
