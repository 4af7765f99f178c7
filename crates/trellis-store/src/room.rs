//! The room row as the engine sees it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trellis_core::{FlowData, RoomId, UserId};

/// A room row from the durable store, reduced to the fields the engine
/// reads. Room creation, invitations, and access lists live elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    /// The room id.
    pub id: RoomId,
    /// The owning user.
    pub owner_id: UserId,
    /// Whether non-members may view the room.
    pub is_public: bool,
    /// The stored flow blob. `None` for rooms that were never synced.
    pub flow_data: Option<serde_json::Value>,
    /// Last durable write.
    pub updated_at: DateTime<Utc>,
}

impl RoomRecord {
    /// Materialize the stored blob, defaulting missing pieces to empty.
    #[must_use]
    pub fn flow(&self) -> FlowData {
        FlowData::from_stored(self.flow_data.clone())
    }
}
