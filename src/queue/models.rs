//! Job queue domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job lifecycle: `pending -> running -> {succeeded, failed}`.
/// Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

// Conversion from DB string to JobStatus
impl TryFrom<String> for JobStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {}", value)),
        }
    }
}

/// Which geographic layer to extract from a network model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Buses,
    Lines,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Buses => "buses",
            LayerKind::Lines => "lines",
        }
    }
}

/// The closed set of background job kinds. The queue never carries arbitrary
/// callables; each kind has a typed parameter struct and a worker that knows
/// how to execute it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum JobKind {
    /// Walk the networks directory, register unknown model files and prune
    /// rows whose backing file is gone.
    #[serde(rename = "scan_networks")]
    ScanNetworks { networks_path: String },
    /// Extract a geographic layer (buses or lines) from a model file as
    /// tabular data for map rendering.
    #[serde(rename = "extract_layer")]
    ExtractLayer {
        network_id: Uuid,
        file_path: String,
        layer: LayerKind,
    },
    /// Render the network topology as SVG and store it on the network row.
    #[serde(rename = "render_topology")]
    RenderTopology { network_id: Uuid, file_path: String },
}

pub const JOB_TYPE_SCAN_NETWORKS: &str = "scan_networks";
pub const JOB_TYPE_EXTRACT_LAYER: &str = "extract_layer";
pub const JOB_TYPE_RENDER_TOPOLOGY: &str = "render_topology";

impl JobKind {
    pub fn job_type_name(&self) -> &'static str {
        match self {
            JobKind::ScanNetworks { .. } => JOB_TYPE_SCAN_NETWORKS,
            JobKind::ExtractLayer { .. } => JOB_TYPE_EXTRACT_LAYER,
            JobKind::RenderTopology { .. } => JOB_TYPE_RENDER_TOPOLOGY,
        }
    }

    /// Kind-specific parameters as stored in the `parameters` column.
    pub fn parameters(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map
                .get("params")
                .cloned()
                .unwrap_or(serde_json::Value::Null),
            _ => serde_json::Value::Null,
        }
    }
}

/// Error kinds recorded on failed jobs.
pub mod error_kind {
    /// A referenced resource (network row, model file) does not exist.
    pub const NOT_FOUND: &str = "not_found";
    /// The model file could not be read.
    pub const IO: &str = "io";
    /// The model file exists but is not a valid network model.
    pub const INVALID_MODEL: &str = "invalid_model";
    /// The claiming worker died; the job was failed by the reaper.
    pub const WORKER_LOST: &str = "worker_lost";
    pub const INTERNAL: &str = "internal";
}

/// One unit of deferred work, as tracked in the job record store.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Reconstruct the typed job kind from the stored type name and
    /// parameters.
    pub fn kind(&self) -> Result<JobKind, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "type": self.job_type,
            "params": self.parameters,
        }))
    }
}

/// Response envelope returned to callers on job submission. The status is
/// always `pending` at the instant the submission returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_db_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert_eq!(
                JobStatus::try_from(status.as_str().to_string()).unwrap(),
                status
            );
        }
        assert!(JobStatus::try_from("cancelled".to_string()).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn job_kind_names_match_serde_tags() {
        let kind = JobKind::ScanNetworks {
            networks_path: "/data/networks".to_string(),
        };
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], kind.job_type_name());
        assert_eq!(value["params"]["networks_path"], "/data/networks");
    }

    #[test]
    fn job_kind_round_trips_through_job_columns() {
        let kind = JobKind::ExtractLayer {
            network_id: Uuid::new_v4(),
            file_path: "/data/networks/grid.json".to_string(),
            layer: LayerKind::Lines,
        };

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

        match job.kind().unwrap() {
            JobKind::ExtractLayer {
                file_path, layer, ..
            } => {
                assert_eq!(file_path, "/data/networks/grid.json");
                assert_eq!(layer, LayerKind::Lines);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn task_response_serializes_pending_lowercase() {
        let response = TaskResponse {
            job_id: Uuid::new_v4(),
            status: JobStatus::Pending,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "pending");
    }
}
