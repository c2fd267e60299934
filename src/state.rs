//! Shared application state

use crate::config::Config;
use crate::queue::{InlineJobQueue, JobQueue, PostgresJobQueue};
use crate::Result;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Which queue implementation backs the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobQueueKind {
    Postgres,
    /// In-memory queue; used by tests and single-process setups.
    Inline,
}

#[derive(Debug, Clone)]
pub struct AppStateOptions {
    pub run_migrations: bool,
    /// Connect eagerly and fail fast. Tests use a lazy pool so no live
    /// database is needed for routes that never touch it.
    pub eager_connect: bool,
    pub job_queue: JobQueueKind,
}

impl Default for AppStateOptions {
    fn default() -> Self {
        Self {
            run_migrations: true,
            eager_connect: true,
            job_queue: JobQueueKind::Postgres,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: PgPool,
    pub job_queue: Arc<dyn JobQueue>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        Self::new_with_options(config, AppStateOptions::default()).await
    }

    pub async fn new_with_options(config: Config, options: AppStateOptions) -> Result<Self> {
        let connect_options = PgConnectOptions::from_str(&config.database.url)
            .map_err(|e| crate::Error::Internal(format!("invalid database URL: {e}")))?;

        let pool_options = PgPoolOptions::new()
            .min_connections(config.database.pool_min_size)
            .max_connections(config.database.pool_max_size)
            .acquire_timeout(Duration::from_secs(config.database.pool_timeout_seconds));

        let db_pool = if options.eager_connect {
            pool_options.connect_with(connect_options).await?
        } else {
            pool_options.connect_lazy_with(connect_options)
        };

        if options.run_migrations {
            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .map_err(|e| crate::Error::Internal(format!("migration failed: {e}")))?;
        }

        let job_queue: Arc<dyn JobQueue> = match options.job_queue {
            JobQueueKind::Postgres => Arc::new(PostgresJobQueue::new(db_pool.clone())),
            JobQueueKind::Inline => Arc::new(InlineJobQueue::new()),
        };

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            job_queue,
        })
    }
}
