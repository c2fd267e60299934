//! Map visualization handlers

use super::get_visible_network;
use crate::api::extractors::CurrentUser;
use crate::queue::{JobKind, LayerKind};
use crate::state::AppState;
use crate::{Error, Result};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// Map configuration handed to the frontend.
pub async fn map_config(State(state): State<AppState>) -> Response {
    Json(json!({
        "mapbox_token": state.config.map.mapbox_token.as_deref().unwrap_or(""),
    }))
    .into_response()
}

async fn queue_layer(
    state: AppState,
    network_id: Uuid,
    user: Option<&crate::models::User>,
    layer: LayerKind,
) -> Result<Response> {
    let network = get_visible_network(&state, network_id, user).await?;

    // No de-duplication: concurrent requests each get their own job.
    let task = state
        .job_queue
        .enqueue(JobKind::ExtractLayer {
            network_id: network.id,
            file_path: network.file_path,
            layer,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(task)).into_response())
}

/// Queue extraction of network buses as tabular data for the map.
pub async fn get_buses(
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    queue_layer(state, network_id, user.as_ref(), LayerKind::Buses).await
}

/// Queue extraction of network lines as tabular data for the map.
pub async fn get_lines(
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    queue_layer(state, network_id, user.as_ref(), LayerKind::Lines).await
}

/// Serve the precomputed SVG topology for a network.
pub async fn topology_svg(
    State(state): State<AppState>,
    Path(network_id): Path<Uuid>,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    let network = get_visible_network(&state, network_id, user.as_ref()).await?;

    let Some(svg) = network.topology_svg else {
        return Err(Error::NotFound {
            resource: "Network topology SVG",
            id: network_id.to_string(),
        });
    };

    tracing::debug!(
        network_id = %network_id,
        svg_size = svg.len(),
        "Returning stored topology SVG"
    );

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/svg+xml")],
        svg,
    )
        .into_response())
}
