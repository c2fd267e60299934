//! The queue contract between route handlers and background workers

use super::models::{Job, JobKind, JobStatus, TaskResponse};
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

/// Stream of exclusively claimed jobs, already transitioned to `running`.
pub type JobStream = Pin<Box<dyn Stream<Item = Result<Job>> + Send>>;

/// Job record store plus enqueue/claim protocol.
///
/// Guarantees all implementations must uphold:
/// - `enqueue` creates the job in `pending` state before returning and never
///   executes work inline on the caller.
/// - A `pending -> running` claim is exclusive: concurrent claims on the same
///   job hand it to exactly one worker.
/// - `complete`/`fail` apply only to `running` jobs; terminal states never
///   regress and at most one of result/error is ever populated.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a unit of work. Fire-and-forget: returns as soon as the job
    /// record exists, with status `pending`.
    async fn enqueue(&self, kind: JobKind) -> Result<TaskResponse>;

    /// Idempotent, side-effect-free status read.
    async fn job(&self, id: Uuid) -> Result<Option<Job>>;

    /// List jobs, newest first, with optional type/status filters.
    async fn list(
        &self,
        job_type: Option<&str>,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Job>, i64)>;

    /// Claim the oldest pending job of one of the given types, transitioning
    /// it to `running` under `worker_id`. Returns `None` when nothing is
    /// pending.
    async fn try_claim(&self, job_types: &[String], worker_id: &str) -> Result<Option<Job>>;

    /// Mark a running job succeeded and record its result.
    async fn complete(&self, id: Uuid, result: serde_json::Value) -> Result<()>;

    /// Mark a running job failed and record the error kind and message.
    async fn fail(&self, id: Uuid, kind: &str, message: &str) -> Result<()>;

    /// Fail `running` jobs whose worker has not finished within `older_than`.
    /// Returns the number of jobs reaped.
    async fn reap_stale(&self, older_than: Duration) -> Result<u64>;

    /// Stream of claimed jobs for a worker. Implementations drain pending
    /// jobs first, then block until new work arrives.
    async fn listen(&self, job_types: &[String], worker_id: &str) -> Result<JobStream>;
}
