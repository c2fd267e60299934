//! Custom axum extractors

use crate::models::User;
use crate::state::AppState;
use crate::{db, Error};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// The caller's identity, resolved once at the request boundary.
///
/// Auth disabled: every caller is anonymous and unrestricted. Auth enabled:
/// a bearer token is looked up in the users table; a missing token yields an
/// anonymous caller (who sees public and ownerless networks only), an
/// unknown token is rejected.
pub struct CurrentUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !state.config.auth.enabled {
            return Ok(CurrentUser(None));
        }

        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        let Some(token) = token else {
            return Ok(CurrentUser(None));
        };

        match db::users::find_by_token(&state.db_pool, token).await? {
            Some(user) => Ok(CurrentUser(Some(user))),
            None => Err(Error::Unauthorized("unknown API token".to_string())),
        }
    }
}
