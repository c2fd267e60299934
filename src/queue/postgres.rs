//! PostgreSQL-backed job queue
//!
//! Enqueue inserts a `pending` row and fires a NOTIFY; claims use
//! `FOR UPDATE SKIP LOCKED` so that concurrent workers never double-claim.
//! Terminal transitions are guarded on `status = 'running'`, which makes
//! regression from a terminal state impossible at the store level.

use super::models::{error_kind, Job, JobKind, JobStatus, TaskResponse};
use super::traits::{JobQueue, JobStream};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

const JOBS_CHANNEL: &str = "gridscope_jobs";

const JOB_COLUMNS: &str = "id, job_type, status, parameters, result, error_kind, \
     error_message, worker_id, created_at, started_at, finished_at";

pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Broker-unreachable failures must surface as service-unavailable to the
/// submitting caller, not as opaque internal errors.
fn queue_error(e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            Error::QueueUnavailable(e.to_string())
        }
        other => Error::Database(other),
    }
}

async fn claim_pending(
    pool: &PgPool,
    job_types: &[String],
    worker_id: &str,
) -> Result<Option<Job>> {
    let query = format!(
        r#"
        UPDATE jobs
        SET status = 'running',
            started_at = $1,
            worker_id = $2
        WHERE id = (
            SELECT id
            FROM jobs
            WHERE job_type = ANY($3)
              AND status = 'pending'
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {JOB_COLUMNS}
        "#
    );

    sqlx::query_as::<_, Job>(&query)
        .bind(Utc::now())
        .bind(worker_id)
        .bind(job_types)
        .fetch_optional(pool)
        .await
        .map_err(queue_error)
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(&self, kind: JobKind) -> Result<TaskResponse> {
        let job_id = Uuid::new_v4();
        let job_type = kind.job_type_name();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, status, parameters, created_at)
            VALUES ($1, $2, 'pending', $3, $4)
            "#,
        )
        .bind(job_id)
        .bind(job_type)
        .bind(kind.parameters())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(queue_error)?;

        // Wake listening workers. The row is already committed, so a lost
        // notification only delays pickup until the next drain.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(JOBS_CHANNEL)
            .bind(job_type)
            .execute(&self.pool)
            .await
        {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to notify job channel");
        }

        tracing::debug!(job_id = %job_id, job_type, "Enqueued job");

        Ok(TaskResponse {
            job_id,
            status: JobStatus::Pending,
        })
    }

    async fn job(&self, id: Uuid) -> Result<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(queue_error)
    }

    async fn list(
        &self,
        job_type: Option<&str>,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Job>, i64)> {
        let mut query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE 1=1");
        let mut count_query = String::from("SELECT COUNT(*) FROM jobs WHERE 1=1");
        let mut params: Vec<String> = Vec::new();

        if let Some(jt) = job_type {
            params.push(jt.to_string());
            let n = params.len();
            query.push_str(&format!(" AND job_type = ${n}"));
            count_query.push_str(&format!(" AND job_type = ${n}"));
        }

        if let Some(s) = status {
            params.push(s.as_str().to_string());
            let n = params.len();
            query.push_str(&format!(" AND status = ${n}"));
            count_query.push_str(&format!(" AND status = ${n}"));
        }

        query.push_str(" ORDER BY created_at DESC");
        query.push_str(&format!(
            " LIMIT ${} OFFSET ${}",
            params.len() + 1,
            params.len() + 2
        ));

        let mut count = sqlx::query_scalar::<_, i64>(&count_query);
        for param in &params {
            count = count.bind(param);
        }
        let total = count.fetch_one(&self.pool).await.map_err(queue_error)?;

        let mut rows = sqlx::query_as::<_, Job>(&query);
        for param in &params {
            rows = rows.bind(param);
        }
        let jobs = rows
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(queue_error)?;

        Ok((jobs, total))
    }

    async fn try_claim(&self, job_types: &[String], worker_id: &str) -> Result<Option<Job>> {
        claim_pending(&self.pool, job_types, worker_id).await
    }

    async fn complete(&self, id: Uuid, result: serde_json::Value) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded', result = $2, finished_at = $3
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(result)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(queue_error)?;

        if updated.rows_affected() == 0 {
            return Err(Error::Internal(format!(
                "job {id} is not running; refusing terminal transition"
            )));
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, kind: &str, message: &str) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', error_kind = $2, error_message = $3, finished_at = $4
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(id)
        .bind(kind)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(queue_error)?;

        if updated.rows_affected() == 0 {
            return Err(Error::Internal(format!(
                "job {id} is not running; refusing terminal transition"
            )));
        }
        Ok(())
    }

    async fn reap_stale(&self, older_than: Duration) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_default();

        let reaped = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                error_kind = $1,
                error_message = 'worker did not finish the job; presumed dead',
                finished_at = $2
            WHERE status = 'running' AND started_at < $3
            "#,
        )
        .bind(error_kind::WORKER_LOST)
        .bind(Utc::now())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(queue_error)?;

        Ok(reaped.rows_affected())
    }

    async fn listen(&self, job_types: &[String], worker_id: &str) -> Result<JobStream> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(queue_error)?;
        listener.listen(JOBS_CHANNEL).await.map_err(queue_error)?;

        let pool = self.pool.clone();
        let job_types = job_types.to_vec();
        let worker_id = worker_id.to_string();

        // Drain-then-wait: notifications arriving while we drain are buffered
        // by the listener, so no committed job is missed.
        let stream = async_stream::try_stream! {
            loop {
                while let Some(job) = claim_pending(&pool, &job_types, &worker_id).await? {
                    yield job;
                }
                listener.recv().await.map_err(queue_error)?;
            }
        };

        Ok(Box::pin(stream))
    }
}
