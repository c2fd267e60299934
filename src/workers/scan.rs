//! Network directory scan worker
//!
//! Reconciles the networks directory with the database: registers unknown
//! model files and prunes rows whose backing file is gone. Pruning also
//! cleans up after a network deletion that removed the file but lost the row
//! delete (the two are not transactional).

use super::base::{JobFailure, Worker};
use crate::db;
use crate::queue::{Job, JobKind, JOB_TYPE_SCAN_NETWORKS};
use async_trait::async_trait;
use sqlx::PgPool;
use std::path::{Path, PathBuf};

pub struct ScanWorker {
    pool: PgPool,
}

impl ScanWorker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DiscoveredFile {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Model files in `dir`, sorted by name. Only `*.json` model exports count;
/// anything else in the directory is ignored.
pub(crate) fn scan_directory(dir: &Path) -> std::io::Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        files.push(DiscoveredFile {
            filename,
            size: entry.metadata()?.len(),
            path,
        });
    }

    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

#[async_trait]
impl Worker for ScanWorker {
    fn name(&self) -> &'static str {
        "ScanWorker"
    }

    fn supported_job_types(&self) -> &[&'static str] {
        &[JOB_TYPE_SCAN_NETWORKS]
    }

    async fn process_job(&self, job: &Job) -> Result<serde_json::Value, JobFailure> {
        let networks_path = match job.kind() {
            Ok(JobKind::ScanNetworks { networks_path }) => networks_path,
            Ok(other) => {
                return Err(JobFailure::new(
                    crate::queue::error_kind::INTERNAL,
                    format!("ScanWorker cannot execute {}", other.job_type_name()),
                ))
            }
            Err(e) => {
                return Err(JobFailure::new(
                    crate::queue::error_kind::INTERNAL,
                    format!("Malformed job parameters: {e}"),
                ))
            }
        };

        let dir = PathBuf::from(&networks_path);
        let discovered = scan_directory(&dir)
            .map_err(|e| JobFailure::io(format!("Cannot read {networks_path}: {e}")))?;
        let scanned = discovered.len();

        let mut added = 0usize;
        for file in &discovered {
            let file_path = file.path.to_string_lossy();
            if db::networks::insert_discovered(
                &self.pool,
                &file.filename,
                &file_path,
                file.size as i64,
            )
            .await?
            {
                tracing::info!(filename = %file.filename, "Registered new network file");
                added += 1;
            }
        }

        // Prune rows under this directory whose file vanished.
        let mut missing = Vec::new();
        for (id, file_path) in db::networks::all_file_paths(&self.pool).await? {
            let path = Path::new(&file_path);
            if path.starts_with(&dir) && !path.exists() {
                tracing::info!(network_id = %id, file_path, "Pruning network with missing file");
                missing.push(id);
            }
        }
        let removed = db::networks::delete_many(&self.pool, &missing).await?;

        Ok(serde_json::json!({
            "scanned": scanned,
            "added": added,
            "removed": removed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_only_json_model_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("grid-a.json"), b"{}")?;
        std::fs::write(dir.path().join("grid-b.json"), b"{\"buses\":[]}")?;
        std::fs::write(dir.path().join("notes.txt"), b"not a model")?;
        std::fs::create_dir(dir.path().join("nested.json"))?;

        let files = scan_directory(dir.path())?;
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["grid-a.json", "grid-b.json"]);
        assert_eq!(files[1].size, 12);
        Ok(())
    }

    #[test]
    fn empty_directory_is_fine() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(scan_directory(dir.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(scan_directory(Path::new("/definitely/not/here")).is_err());
    }
}
