//! Versioned API routes

use crate::api::handlers::{jobs, map, networks};
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Networks
        .route(
            "/networks",
            put(networks::scan_networks).get(networks::list_networks),
        )
        .route(
            "/networks/:network_id",
            get(networks::get_network).delete(networks::delete_network),
        )
        .route(
            "/networks/:network_id/topology",
            post(networks::queue_topology),
        )
        // Map layers
        .route("/map/config", get(map::map_config))
        .route("/map/:network_id/buses", get(map::get_buses))
        .route("/map/:network_id/lines", get(map::get_lines))
        .route("/map/:network_id/topology.svg", get(map::topology_svg))
        // Jobs
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:job_id", get(jobs::get_job))
}
