use crate::models::User;
use crate::Result;
use sqlx::PgPool;

pub async fn find_by_token(pool: &PgPool, token: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, api_token, created_at FROM users WHERE api_token = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}
