//! In-memory job queue
//!
//! Backs tests and single-process deployments where no broker is available.
//! Upholds the same protocol guarantees as the Postgres implementation:
//! exclusive claims and guarded terminal transitions.

use super::models::{error_kind, Job, JobKind, JobStatus, TaskResponse};
use super::traits::{JobQueue, JobStream};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct InlineJobQueue {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
    notify: Arc<Notify>,
}

impl InlineJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_locked(&self, job_types: &[String], worker_id: &str) -> Option<Job> {
        let mut jobs = self.jobs.lock().expect("job map poisoned");

        // Oldest pending job of a supported type; id breaks creation-time ties.
        let id = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && job_types.contains(&j.job_type))
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id)?;

        let job = jobs.get_mut(&id).expect("job disappeared under lock");
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job.worker_id = Some(worker_id.to_string());
        Some(job.clone())
    }

    fn finish_locked(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut Job),
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("job map poisoned");
        let job = jobs.get_mut(&id).ok_or_else(|| {
            Error::Internal(format!("job {id} does not exist"))
        })?;

        if job.status != JobStatus::Running {
            return Err(Error::Internal(format!(
                "job {id} is not running; refusing terminal transition"
            )));
        }

        apply(job);
        job.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl JobQueue for InlineJobQueue {
    async fn enqueue(&self, kind: JobKind) -> Result<TaskResponse> {
        let job = Job {
            id: Uuid::new_v4(),
            job_type: kind.job_type_name().to_string(),
            status: JobStatus::Pending,
            parameters: kind.parameters(),
            result: None,
            error_kind: None,
            error_message: None,
            worker_id: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let response = TaskResponse {
            job_id: job.id,
            status: JobStatus::Pending,
        };

        self.jobs
            .lock()
            .expect("job map poisoned")
            .insert(job.id, job);
        self.notify.notify_waiters();

        Ok(response)
    }

    async fn job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.lock().expect("job map poisoned").get(&id).cloned())
    }

    async fn list(
        &self,
        job_type: Option<&str>,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Job>, i64)> {
        let jobs = self.jobs.lock().expect("job map poisoned");
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|j| job_type.map_or(true, |t| j.job_type == t))
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn try_claim(&self, job_types: &[String], worker_id: &str) -> Result<Option<Job>> {
        Ok(self.claim_locked(job_types, worker_id))
    }

    async fn complete(&self, id: Uuid, result: serde_json::Value) -> Result<()> {
        self.finish_locked(id, |job| {
            job.status = JobStatus::Succeeded;
            job.result = Some(result);
        })
    }

    async fn fail(&self, id: Uuid, kind: &str, message: &str) -> Result<()> {
        let kind = kind.to_string();
        let message = message.to_string();
        self.finish_locked(id, |job| {
            job.status = JobStatus::Failed;
            job.error_kind = Some(kind);
            job.error_message = Some(message);
        })
    }

    async fn reap_stale(&self, older_than: Duration) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_default();
        let mut jobs = self.jobs.lock().expect("job map poisoned");

        let mut reaped = 0;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Running && job.started_at.is_some_and(|t| t < cutoff) {
                job.status = JobStatus::Failed;
                job.error_kind = Some(error_kind::WORKER_LOST.to_string());
                job.error_message =
                    Some("worker did not finish the job; presumed dead".to_string());
                job.finished_at = Some(Utc::now());
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    async fn listen(&self, job_types: &[String], worker_id: &str) -> Result<JobStream> {
        let queue = self.clone();
        let job_types = job_types.to_vec();
        let worker_id = worker_id.to_string();

        let stream = async_stream::try_stream! {
            loop {
                // Register interest before checking: an enqueue between the
                // empty claim and the await would otherwise be lost.
                let notified = queue.notify.notified();
                match queue.claim_locked(&job_types, &worker_id) {
                    Some(job) => yield job,
                    None => notified.await,
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
