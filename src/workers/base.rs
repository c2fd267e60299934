//! Base worker trait and job outcome types

use crate::queue::{error_kind, Job};
use async_trait::async_trait;

/// A job-level failure: recorded on the job row, never propagated to the
/// request that submitted the job.
#[derive(Debug, Clone)]
pub struct JobFailure {
    pub kind: String,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(error_kind::IO, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(error_kind::NOT_FOUND, message)
    }

    pub fn invalid_model(message: impl Into<String>) -> Self {
        Self::new(error_kind::INVALID_MODEL, message)
    }
}

impl From<crate::Error> for JobFailure {
    fn from(e: crate::Error) -> Self {
        match &e {
            crate::Error::NotFound { .. } => Self::new(error_kind::NOT_FOUND, e.to_string()),
            _ => Self::new(error_kind::INTERNAL, e.to_string()),
        }
    }
}

/// Base trait for all background workers.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Worker name for logging.
    fn name(&self) -> &'static str;

    /// Job types this worker executes.
    fn supported_job_types(&self) -> &[&'static str];

    /// Execute a claimed job. The returned value becomes the job result.
    async fn process_job(&self, job: &Job) -> Result<serde_json::Value, JobFailure>;
}
