//! GridScope - power-system network backend
//!
//! A web backend for browsing and visualizing power-system network models:
//! - CRUD over network records with ownership-aware visibility
//! - Map-layer extraction (buses/lines) via background jobs
//! - SVG topology rendering
//! - PostgreSQL-backed job queue with LISTEN/NOTIFY pickup

pub mod api;
pub mod background;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod queue;
pub mod state;
pub mod workers;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
