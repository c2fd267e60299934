//! Full-stack tests against a real Postgres
//!
//! Each test gets its own schema on `database.test_database_url`
//! (`GRIDSCOPE_DATABASE__TEST_DATABASE_URL`), migrated on startup and dropped
//! afterwards, so tests run in parallel without interfering. The whole suite
//! is skipped when no test database is configured.

mod support;

use anyhow::Context as _;
use axum::http::{Method, StatusCode};
use futures::FutureExt as _;
use gridscope::{
    api::create_router,
    db,
    state::{AppStateOptions, JobQueueKind},
    AppState, Config,
};
use sqlx::Connection as _;
use std::future::Future;
use std::pin::Pin;
use support::TestApp;
use uuid::Uuid;

struct LiveApp {
    app: TestApp,
    schema: String,
    admin_database_url: String,
}

impl LiveApp {
    /// `None` when `database.test_database_url` is not configured.
    async fn new_with_config(configure: impl FnOnce(&mut Config)) -> anyhow::Result<Option<Self>> {
        support::init_tracing();

        let mut config = Config::load().context("load Config for tests")?;
        let Some(admin_database_url) = config.database.test_database_url.clone() else {
            return Ok(None);
        };

        // Per-test schema and DB pool.
        let schema = format!("test_{}", Uuid::new_v4().simple());
        let mut admin_conn = sqlx::PgConnection::connect(&admin_database_url)
            .await
            .context("connect admin db for schema create")?;
        sqlx::query(&format!(r#"CREATE SCHEMA "{schema}""#))
            .execute(&mut admin_conn)
            .await
            .context("create test schema")?;

        config.database.url = with_search_path(&admin_database_url, &schema);
        config.database.pool_min_size = 0;
        // Keep per-test pools small so parallel tests do not exhaust Postgres
        // connections.
        config.database.pool_max_size = 2;
        config.auth.enabled = false;
        config.workers.enabled = false;
        configure(&mut config);

        let state = AppState::new_with_options(
            config,
            AppStateOptions {
                run_migrations: true,
                eager_connect: true,
                job_queue: JobQueueKind::Inline,
            },
        )
        .await
        .context("initialize AppState")?;

        let router = create_router(state.clone());

        Ok(Some(Self {
            app: TestApp { router, state },
            schema,
            admin_database_url,
        }))
    }

    async fn cleanup(self) -> anyhow::Result<()> {
        self.app.state.db_pool.close().await;

        let mut admin_conn = sqlx::PgConnection::connect(&self.admin_database_url)
            .await
            .context("connect admin db for schema drop")?;
        sqlx::query(&format!(r#"DROP SCHEMA "{}" CASCADE"#, self.schema))
            .execute(&mut admin_conn)
            .await
            .context("drop test schema")?;

        Ok(())
    }
}

async fn with_live_app<F>(f: F) -> anyhow::Result<()>
where
    F: for<'a> FnOnce(
        &'a TestApp,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + 'a>>,
{
    with_live_app_with_config(|_| {}, f).await
}

async fn with_live_app_with_config<C, F>(configure: C, f: F) -> anyhow::Result<()>
where
    C: FnOnce(&mut Config),
    F: for<'a> FnOnce(
        &'a TestApp,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + 'a>>,
{
    let Some(live) = LiveApp::new_with_config(configure).await? else {
        eprintln!("skipping: database.test_database_url is not configured");
        return Ok(());
    };

    let result = std::panic::AssertUnwindSafe(f(&live.app)).catch_unwind().await;
    let cleanup_result = live.cleanup().await;

    if let Err(e) = cleanup_result {
        eprintln!("test schema cleanup failed: {e:?}");
    }

    match result {
        Ok(r) => r,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn with_search_path(database_url: &str, schema: &str) -> String {
    let sep = if database_url.contains('?') { '&' } else { '?' };
    format!("{database_url}{sep}options=-c%20search_path%3D{schema}")
}

async fn seed_user(pool: &sqlx::PgPool, username: &str, token: &str) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, username, api_token) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(username)
        .bind(token)
        .execute(pool)
        .await
        .context("seed user")?;
    Ok(id)
}

async fn seed_network(
    pool: &sqlx::PgPool,
    filename: &str,
    file_path: &str,
    user_id: Option<Uuid>,
    is_public: bool,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO networks (id, filename, file_path, user_id, is_public) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(filename)
    .bind(file_path)
    .bind(user_id)
    .bind(is_public)
    .execute(pool)
    .await
    .context("seed network")?;
    Ok(id)
}

fn write_model_file(dir: &tempfile::TempDir, name: &str) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, br#"{"buses": [], "lines": []}"#)?;
    Ok(path)
}

#[tokio::test]
async fn deleting_network_removes_file_and_row() -> anyhow::Result<()> {
    with_live_app(|app| {
        Box::pin(async move {
            let dir = tempfile::tempdir()?;
            let path = write_model_file(&dir, "grid.json")?;
            let id = seed_network(
                &app.state.db_pool,
                "grid.json",
                path.to_str().unwrap(),
                None,
                false,
            )
            .await?;

            let (status, _, body) = app
                .request(Method::DELETE, &format!("/api/v1/networks/{id}"), None)
                .await?;
            assert_eq!(status, StatusCode::OK);
            let body: serde_json::Value = serde_json::from_slice(&body)?;
            assert!(body["message"].as_str().unwrap().contains("deleted"));

            // File and row are both gone; a subsequent fetch is not-found.
            assert!(!path.exists());
            let (status, body) = app.get_json(&format!("/api/v1/networks/{id}")).await?;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["error"]["kind"], "not_found");
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn only_owner_may_delete_owned_network() -> anyhow::Result<()> {
    with_live_app_with_config(
        |config| {
            config.auth.enabled = true;
        },
        |app| {
            Box::pin(async move {
                let pool = &app.state.db_pool;
                let owner_id = seed_user(pool, "owner", "owner-token").await?;
                seed_user(pool, "stranger", "stranger-token").await?;

                let dir = tempfile::tempdir()?;
                let path = write_model_file(&dir, "owned.json")?;
                // Public, so the stranger can see it but still not delete it.
                let id = seed_network(
                    pool,
                    "owned.json",
                    path.to_str().unwrap(),
                    Some(owner_id),
                    true,
                )
                .await?;

                let (status, _, _) = app
                    .request_with_extra_headers(
                        Method::DELETE,
                        &format!("/api/v1/networks/{id}"),
                        None,
                        &[("authorization", "Bearer stranger-token")],
                    )
                    .await?;
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert!(path.exists());

                let (status, _, _) = app
                    .request_with_extra_headers(
                        Method::DELETE,
                        &format!("/api/v1/networks/{id}"),
                        None,
                        &[("authorization", "Bearer owner-token")],
                    )
                    .await?;
                assert_eq!(status, StatusCode::OK);
                assert!(!path.exists());
                Ok(())
            })
        },
    )
    .await
}

#[tokio::test]
async fn concurrent_layer_requests_get_distinct_job_ids() -> anyhow::Result<()> {
    with_live_app(|app| {
        Box::pin(async move {
            let id = seed_network(
                &app.state.db_pool,
                "grid.json",
                "/data/networks/grid.json",
                None,
                false,
            )
            .await?;

            let path = format!("/api/v1/map/{id}/buses");
            let (first, second) = tokio::join!(
                app.request(Method::GET, &path, None),
                app.request(Method::GET, &path, None),
            );
            let (status_a, _, body_a) = first?;
            let (status_b, _, body_b) = second?;
            assert_eq!(status_a, StatusCode::ACCEPTED);
            assert_eq!(status_b, StatusCode::ACCEPTED);

            let a: serde_json::Value = serde_json::from_slice(&body_a)?;
            let b: serde_json::Value = serde_json::from_slice(&body_b)?;
            assert_eq!(a["status"], "pending");
            assert_ne!(a["job_id"], b["job_id"]);

            // The submission is pollable and carries the layer job type.
            let job_id = a["job_id"].as_str().unwrap();
            let (status, job) = app.get_json(&format!("/api/v1/jobs/{job_id}")).await?;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(job["kind"], "extract_layer");

            let (status, _, _) = app
                .request(Method::GET, &format!("/api/v1/map/{id}/lines"), None)
                .await?;
            assert_eq!(status, StatusCode::ACCEPTED);

            // Unknown networks cannot be queued.
            let (status, _) = app
                .get_json(&format!("/api/v1/map/{}/buses", Uuid::new_v4()))
                .await?;
            assert_eq!(status, StatusCode::NOT_FOUND);
            Ok(())
        })
    })
    .await
}

#[tokio::test]
async fn topology_svg_served_once_generated() -> anyhow::Result<()> {
    with_live_app(|app| {
        Box::pin(async move {
            let pool = &app.state.db_pool;
            let id = seed_network(pool, "grid.json", "/data/networks/grid.json", None, false)
                .await?;

            // Nothing rendered yet.
            let (status, _) = app
                .get_json(&format!("/api/v1/map/{id}/topology.svg"))
                .await?;
            assert_eq!(status, StatusCode::NOT_FOUND);

            let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"></svg>"#;
            db::networks::set_topology_svg(pool, id, svg).await?;

            let (status, headers, body) = app
                .request(Method::GET, &format!("/api/v1/map/{id}/topology.svg"), None)
                .await?;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(headers["content-type"], "image/svg+xml");
            assert_eq!(body.as_ref(), svg.as_bytes());
            Ok(())
        })
    })
    .await
}
