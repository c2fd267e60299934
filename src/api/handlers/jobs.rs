//! Job status handlers

use crate::queue::{Job, JobStatus};
use crate::state::AppState;
use crate::{Error, Result};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

fn job_envelope(job: &Job) -> serde_json::Value {
    let mut body = json!({
        "job_id": job.id,
        "kind": job.job_type,
        "status": job.status,
        "created_at": job.created_at,
        "started_at": job.started_at,
        "finished_at": job.finished_at,
    });

    if let Some(result) = &job.result {
        body["result"] = result.clone();
    }
    if job.status == JobStatus::Failed {
        body["error"] = json!({
            "kind": job.error_kind,
            "message": job.error_message,
        });
    }
    body
}

/// Poll a job by id. Side-effect free.
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Result<Response> {
    let job = state
        .job_queue
        .job(job_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Job",
            id: job_id.to_string(),
        })?;

    Ok(Json(job_envelope(&job)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub kind: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(q): Query<ListJobsQuery>,
) -> Result<Response> {
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    let offset = q.offset.unwrap_or(0).max(0);

    let status = q
        .status
        .map(|s| {
            JobStatus::try_from(s).map_err(Error::Validation)
        })
        .transpose()?;

    let (jobs, total) = state
        .job_queue
        .list(q.kind.as_deref(), status, limit, offset)
        .await?;

    Ok(Json(json!({
        "jobs": jobs.iter().map(job_envelope).collect::<Vec<_>>(),
        "total": total,
        "limit": limit,
        "offset": offset,
    }))
    .into_response())
}
