//! Queries over the `networks` table

use crate::models::{Network, User};
use crate::Result;
use sqlx::PgPool;
use uuid::Uuid;

const NETWORK_COLUMNS: &str =
    "id, filename, file_path, user_id, is_public, topology_svg, file_size, created_at";

/// Who is asking, for visibility filtering. `Everyone` is used when
/// authentication is disabled.
#[derive(Debug, Clone, Copy)]
pub enum Viewer<'a> {
    Everyone,
    Anonymous,
    User(&'a User),
}

impl<'a> Viewer<'a> {
    pub fn from_request(auth_enabled: bool, user: Option<&'a User>) -> Self {
        if !auth_enabled {
            return Viewer::Everyone;
        }
        match user {
            Some(user) => Viewer::User(user),
            None => Viewer::Anonymous,
        }
    }
}

/// List networks visible to the viewer, newest first.
pub async fn list(
    pool: &PgPool,
    viewer: Viewer<'_>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<Network>, i64)> {
    // Visible = own networks, public networks, legacy networks without owner.
    let visibility = match viewer {
        Viewer::Everyone => "",
        Viewer::Anonymous => " WHERE (is_public OR user_id IS NULL)",
        Viewer::User(_) => " WHERE (user_id = $3 OR is_public OR user_id IS NULL)",
    };

    let query =
        format!("SELECT {NETWORK_COLUMNS} FROM networks{visibility} ORDER BY created_at DESC LIMIT $1 OFFSET $2");
    let count_query = format!(
        "SELECT COUNT(*) FROM networks{}",
        visibility.replace("$3", "$1")
    );

    let (total, networks) = match viewer {
        Viewer::User(user) => {
            let total = sqlx::query_scalar::<_, i64>(&count_query)
                .bind(user.id)
                .fetch_one(pool)
                .await?;
            let networks = sqlx::query_as::<_, Network>(&query)
                .bind(limit)
                .bind(skip)
                .bind(user.id)
                .fetch_all(pool)
                .await?;
            (total, networks)
        }
        _ => {
            let total = sqlx::query_scalar::<_, i64>(&count_query)
                .fetch_one(pool)
                .await?;
            let networks = sqlx::query_as::<_, Network>(&query)
                .bind(limit)
                .bind(skip)
                .fetch_all(pool)
                .await?;
            (total, networks)
        }
    };

    Ok((networks, total))
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Network>> {
    let query = format!("SELECT {NETWORK_COLUMNS} FROM networks WHERE id = $1");
    let network = sqlx::query_as::<_, Network>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(network)
}

/// Register a discovered model file. Returns false when the path is already
/// registered.
pub async fn insert_discovered(
    pool: &PgPool,
    filename: &str,
    file_path: &str,
    file_size: i64,
) -> Result<bool> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO networks (id, filename, file_path, file_size)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (file_path) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(filename)
    .bind(file_path)
    .bind(file_size)
    .execute(pool)
    .await?;
    Ok(inserted.rows_affected() > 0)
}

/// All registered (id, file_path) pairs, for reconciling against the
/// filesystem during a scan.
pub async fn all_file_paths(pool: &PgPool) -> Result<Vec<(Uuid, String)>> {
    let rows = sqlx::query_as::<_, (Uuid, String)>("SELECT id, file_path FROM networks")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn delete_many(pool: &PgPool, ids: &[Uuid]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let deleted = sqlx::query("DELETE FROM networks WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(deleted.rows_affected())
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<u64> {
    let deleted = sqlx::query("DELETE FROM networks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(deleted.rows_affected())
}

pub async fn set_topology_svg(pool: &PgPool, id: Uuid, svg: &str) -> Result<u64> {
    let updated = sqlx::query("UPDATE networks SET topology_svg = $2 WHERE id = $1")
        .bind(id)
        .bind(svg)
        .execute(pool)
        .await?;
    Ok(updated.rows_affected())
}
