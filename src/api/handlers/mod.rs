//! Request handlers

pub mod jobs;
pub mod map;
pub mod networks;

use crate::models::{Network, User};
use crate::state::AppState;
use crate::{db, Error, Result};
use uuid::Uuid;

/// Fetch a network the caller may see. Rows hidden from the caller read as
/// absent so their existence is not leaked.
pub(crate) async fn get_visible_network(
    state: &AppState,
    id: Uuid,
    user: Option<&User>,
) -> Result<Network> {
    let network = db::networks::get(&state.db_pool, id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Network",
            id: id.to_string(),
        })?;

    if state.config.auth.enabled && !network.visible_to(user) {
        return Err(Error::NotFound {
            resource: "Network",
            id: id.to_string(),
        });
    }

    Ok(network)
}
