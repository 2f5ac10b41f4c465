//! Acting identity supplied by the caller.

use serde::{Deserialize, Serialize};
use crate::id::UserId;

/// Privilege level of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular learner
    Standard,
    /// Administrator; may act on any enrollment
    Elevated,
}

/// Who is performing an operation. Trusted as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Acting user
    pub user_id: UserId,

    /// Privilege level
    pub role: Role,
}

impl Actor {
    /// A standard learner.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: Role::Standard,
        }
    }

    /// An elevated administrator.
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role: Role::Elevated,
        }
    }

    /// Whether this actor has elevated privilege.
    pub fn is_elevated(&self) -> bool {
        self.role == Role::Elevated
    }

    /// Whether this actor may act on state owned by `owner`.
    pub fn can_act_for(&self, owner: &UserId) -> bool {
        self.is_elevated() || &self.user_id == owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_and_admin_can_act() {
        let owner = UserId::new("alice");
        assert!(Actor::user("alice").can_act_for(&owner));
        assert!(Actor::admin("root").can_act_for(&owner));
        assert!(!Actor::user("bob").can_act_for(&owner));
    }
}
