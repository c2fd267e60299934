//! Job queue abstraction for background processing
//!
//! Provides a trait-based interface for job queues with a PostgreSQL
//! implementation. Uses LISTEN/NOTIFY for instant job pickup and
//! `FOR UPDATE SKIP LOCKED` for exclusive claims. The inline implementation
//! backs tests and single-process deployments.

mod inline;
mod models;
mod postgres;
mod traits;

pub use inline::InlineJobQueue;
pub use models::*;
pub use postgres::PostgresJobQueue;
pub use traits::{JobQueue, JobStream};
