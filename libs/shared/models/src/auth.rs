use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The acting identity after the authentication layer has resolved
/// credentials. Cells never see raw tokens, only this.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActorIdentity {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl ActorIdentity {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }
}
