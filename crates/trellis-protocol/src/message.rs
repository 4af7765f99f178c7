//! Client ↔ server message envelopes.
//!
//! Envelopes are tagged with `type`. A `FLOW_CHANGE` envelope nests the
//! change under `change` (client) / `event` (server) so the payload's
//! own kind tag (`BULK_NODES`, `GRANULAR_EDGES`, …) stays intact inside
//! it.

use serde::{Deserialize, Serialize};

use trellis_core::{
    ChangeEvent, ChangePayload, CursorPosition, FlowData, Participant, Role, RoomId, UserId,
};

use crate::conflict::ConflictNotice;

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Join a room. Must be the first message on a fresh connection;
    /// reconnection always starts over with a new join.
    JoinRoom {
        /// The room to join.
        room_id: RoomId,
        /// Credential for the access oracle.
        token: String,
    },
    /// Submit a document mutation. The server attaches room, author,
    /// and timestamp; clients send only the payload.
    FlowChange {
        /// The change payload (kind-tagged).
        change: ChangePayload,
    },
    /// Report the author's cursor position.
    CursorMove {
        /// Horizontal coordinate.
        x: f64,
        /// Vertical coordinate.
        y: f64,
    },
    /// Leave the room without closing the socket.
    Leave,
}

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Join succeeded: the full snapshot plus the current peers.
    RoomJoined {
        /// The joined room.
        room_id: RoomId,
        /// Current document, including accepted-but-unsynced changes.
        flow_data: FlowData,
        /// Every other participant currently in the room.
        participants: Vec<Participant>,
        /// The joining user's resolved role.
        user_role: Role,
    },
    /// A peer joined.
    ParticipantJoined {
        /// The new peer.
        participant: Participant,
    },
    /// A peer left or disconnected.
    ParticipantLeft {
        /// The departed peer.
        user_id: UserId,
    },
    /// A consolidated document mutation.
    FlowChange {
        /// The consolidated event (kind tag, author, timestamp inside).
        event: ChangeEvent,
    },
    /// A peer moved their cursor.
    CursorMove {
        /// The peer.
        user_id: UserId,
        /// New cursor position.
        cursor: CursorPosition,
    },
    /// One of the recipient's own changes was rejected.
    OperationConflict {
        /// The rejection details.
        #[serde(flatten)]
        notice: ConflictNotice,
    },
    /// A request failed.
    Error {
        /// Human-readable description.
        message: String,
        /// Optional structured details.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl ServerMessage {
    /// Shorthand for an error envelope without details.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            details: None,
        }
    }
}
