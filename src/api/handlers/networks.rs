//! Network CRUD and scan handlers

use super::get_visible_network;
use crate::api::extractors::CurrentUser;
use crate::queue::JobKind;
use crate::state::AppState;
use crate::{db, Error, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Scan the file system for network files and update the database.
/// Returns immediately with a job handle; the scan runs on a worker.
pub async fn scan_networks(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> Result<Response> {
    let networks_path = state.config.storage.networks_dir();
    let task = state
        .job_queue
        .enqueue(JobKind::ScanNetworks {
            networks_path: networks_path.to_string_lossy().into_owned(),
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(task)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListNetworksQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// List networks with pagination, newest first. With auth enabled the caller
/// sees their own, public, and ownerless networks.
pub async fn list_networks(
    State(state): State<AppState>,
    Query(q): Query<ListNetworksQuery>,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    let skip = q.skip.unwrap_or(0).max(0);
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);

    let viewer = db::networks::Viewer::from_request(state.config.auth.enabled, user.as_ref());
    let (networks, total) = db::networks::list(&state.db_pool, viewer, skip, limit).await?;

    Ok(Json(json!({
        "data": networks,
        "meta": {
            "total": total,
            "skip": skip,
            "limit": limit,
            "count": networks.len(),
        }
    }))
    .into_response())
}

pub async fn get_network(
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    let network = get_visible_network(&state, network_id, user.as_ref()).await?;
    Ok(Json(network).into_response())
}

/// Delete a network from the database and the file system.
///
/// The two deletions are not transactional: the file goes first, and a row
/// delete that fails afterwards leaves a row pointing at a missing file,
/// which the next scan prunes.
pub async fn delete_network(
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    let network = get_visible_network(&state, network_id, user.as_ref()).await?;

    if state.config.auth.enabled && !network.deletable_by(user.as_ref()) {
        return Err(Error::Forbidden(
            "You don't have permission to delete this network".to_string(),
        ));
    }

    match tokio::fs::remove_file(&network.file_path).await {
        Ok(()) => {
            tracing::info!(
                network_id = %network.id,
                file_path = %network.file_path,
                filename = %network.filename,
                "Deleted network file"
            );
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                network_id = %network.id,
                file_path = %network.file_path,
                "Network file already gone"
            );
        }
        Err(e) => {
            return Err(Error::Internal(format!(
                "failed to delete network file {}: {e}",
                network.file_path
            )));
        }
    }

    db::networks::delete(&state.db_pool, network.id).await?;

    Ok(Json(json!({
        "message": format!(
            "Network {} and file {} deleted successfully",
            network.id, network.filename
        )
    }))
    .into_response())
}

/// Queue SVG topology rendering for a network.
pub async fn queue_topology(
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    let network = get_visible_network(&state, network_id, user.as_ref()).await?;

    let task = state
        .job_queue
        .enqueue(JobKind::RenderTopology {
            network_id: network.id,
            file_path: network.file_path,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(task)).into_response())
}
