//! Access oracle: who may enter a room, and as what.
//!
//! The engine never authenticates anyone itself — it consumes a
//! validated principal. [`StoreAccessOracle`] is the placeholder
//! implementation that resolves a bare user id as the credential; a
//! deployment with real session issuance swaps in its own oracle
//! without touching the engine.

use std::sync::Arc;

use async_trait::async_trait;

use trellis_core::{Principal, Role, RoomId, UserId};
use trellis_store::DurableStore;

use crate::error::{EngineError, EngineResult};

/// Answers "may principal P access room R, and with what role?".
#[async_trait]
pub trait AccessOracle: Send + Sync {
    /// Resolve a credential to a principal. `None` means the credential
    /// is invalid or expired.
    async fn authenticate(&self, token: &str) -> EngineResult<Option<Principal>>;

    /// Whether the user may access the room at all.
    async fn may_access(&self, room_id: &RoomId, user_id: &UserId) -> EngineResult<bool>;

    /// The user's role in the room. `None` means no access.
    async fn role_in(&self, room_id: &RoomId, user_id: &UserId) -> EngineResult<Option<Role>>;
}

/// Store-backed oracle.
///
/// The credential is the user id itself, looked up in the user table.
/// Owners resolve to [`Role::Owner`], membership rows to their stored
/// role, and public rooms grant [`Role::Viewer`] to anyone
/// authenticated.
pub struct StoreAccessOracle {
    store: Arc<dyn DurableStore>,
}

impl StoreAccessOracle {
    /// Build an oracle over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for StoreAccessOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreAccessOracle").finish_non_exhaustive()
    }
}

#[async_trait]
impl AccessOracle for StoreAccessOracle {
    async fn authenticate(&self, token: &str) -> EngineResult<Option<Principal>> {
        let Ok(user_id) = token.parse::<UserId>() else {
            return Ok(None);
        };
        let name = self.store.user_name(&user_id).await?;
        Ok(name.map(|name| Principal { user_id, name }))
    }

    async fn may_access(&self, room_id: &RoomId, user_id: &UserId) -> EngineResult<bool> {
        Ok(self.role_in(room_id, user_id).await?.is_some())
    }

    async fn role_in(&self, room_id: &RoomId, user_id: &UserId) -> EngineResult<Option<Role>> {
        let Some(room) = self.store.get_room(room_id).await? else {
            return Err(EngineError::RoomNotFound);
        };
        if room.owner_id == *user_id {
            return Ok(Some(Role::Owner));
        }
        if let Some(role) = self.store.participant_role(room_id, user_id).await? {
            return Ok(Some(role));
        }
        Ok(room.is_public.then_some(Role::Viewer))
    }
}
