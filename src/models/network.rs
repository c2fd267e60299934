use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::User;

/// A stored power-system network model: the metadata row for one file under
/// the networks directory.
///
/// Ownership: a network is either owned by exactly one user (`user_id` set),
/// public, or ownerless. Ownerless rows are legacy data imported before
/// authentication existed and are treated as visible to everyone.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Network {
    pub id: Uuid,
    pub filename: String,
    pub file_path: String,
    pub user_id: Option<Uuid>,
    pub is_public: bool,
    #[serde(skip_serializing)]
    pub topology_svg: Option<String>,
    pub file_size: i64,
    pub created_at: DateTime<Utc>,
}

impl Network {
    /// Whether `user` may see this network when authentication is enabled.
    /// Anonymous callers see public and ownerless rows only.
    pub fn visible_to(&self, user: Option<&User>) -> bool {
        if self.is_public || self.user_id.is_none() {
            return true;
        }
        match user {
            Some(user) => self.user_id == Some(user.id),
            None => false,
        }
    }

    /// Whether `user` may delete this network when authentication is enabled.
    /// An owned network may only be deleted by its owner, even when public.
    /// Ownerless networks may be deleted by anyone who can see them.
    pub fn deletable_by(&self, user: Option<&User>) -> bool {
        match self.user_id {
            None => true,
            Some(owner) => user.map(|u| u.id) == Some(owner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: Uuid) -> User {
        User {
            id,
            username: "test".to_string(),
            api_token: "token".to_string(),
            created_at: Utc::now(),
        }
    }

    fn network(user_id: Option<Uuid>, is_public: bool) -> Network {
        Network {
            id: Uuid::new_v4(),
            filename: "grid.json".to_string(),
            file_path: "/data/networks/grid.json".to_string(),
            user_id,
            is_public,
            topology_svg: None,
            file_size: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn owner_sees_private_network() {
        let owner = user(Uuid::new_v4());
        let net = network(Some(owner.id), false);
        assert!(net.visible_to(Some(&owner)));
    }

    #[test]
    fn stranger_cannot_see_private_network() {
        let owner = user(Uuid::new_v4());
        let stranger = user(Uuid::new_v4());
        let net = network(Some(owner.id), false);
        assert!(!net.visible_to(Some(&stranger)));
        assert!(!net.visible_to(None));
    }

    #[test]
    fn public_and_ownerless_visible_to_all() {
        let stranger = user(Uuid::new_v4());
        let public = network(Some(Uuid::new_v4()), true);
        let legacy = network(None, false);
        assert!(public.visible_to(Some(&stranger)));
        assert!(public.visible_to(None));
        assert!(legacy.visible_to(Some(&stranger)));
        assert!(legacy.visible_to(None));
    }

    #[test]
    fn only_owner_deletes_owned_network() {
        let owner = user(Uuid::new_v4());
        let stranger = user(Uuid::new_v4());

        // Public but owned: still only the owner may delete.
        let net = network(Some(owner.id), true);
        assert!(net.deletable_by(Some(&owner)));
        assert!(!net.deletable_by(Some(&stranger)));
        assert!(!net.deletable_by(None));
    }

    #[test]
    fn ownerless_network_deletable_by_anyone() {
        let stranger = user(Uuid::new_v4());
        let legacy = network(None, false);
        assert!(legacy.deletable_by(Some(&stranger)));
        assert!(legacy.deletable_by(None));
    }
}
