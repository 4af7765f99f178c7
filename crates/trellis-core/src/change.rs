//! Change events: the tagged sum of everything a client can do to a room.
//!
//! Five kinds, mirroring the wire protocol: wholesale replacement of the
//! node or edge collection (`BULK_*`), targeted mutations
//! (`GRANULAR_*`), and cursor moves. Granular sub-changes are their own
//! sum types; a generic "array of partials" representation is exactly
//! the shape that invites validation bugs.
//!
//! Events are immutable once stamped. `timestamp` is assigned by the
//! owning room's logical clock at ingest, never taken from the client.

use serde::{Deserialize, Serialize};

use crate::flow::{CursorPosition, Dimensions, Edge, Node, Position};
use crate::id::{EdgeId, NodeId, RoomId, UserId};

/// Milliseconds since the Unix epoch, monotonic per room.
pub type Timestamp = i64;

/// A targeted mutation of the node collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum NodeChange {
    /// Append a new node.
    Add {
        /// The node to append.
        item: Node,
    },
    /// Delete a node by id.
    Remove {
        /// Id of the node to delete.
        id: NodeId,
    },
    /// Substitute a node wholesale.
    Replace {
        /// Id of the node to replace.
        id: NodeId,
        /// The replacement.
        item: Node,
    },
    /// Move a node.
    Position {
        /// Id of the node to move.
        id: NodeId,
        /// New position.
        position: Position,
        /// Absolute position when nested inside a group.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position_absolute: Option<Position>,
    },
    /// Resize a node (client-measured).
    Dimensions {
        /// Id of the node to resize.
        id: NodeId,
        /// New size.
        dimensions: Dimensions,
    },
    /// Toggle selection.
    Select {
        /// Id of the node.
        id: NodeId,
        /// New selection flag.
        selected: bool,
    },
}

impl NodeChange {
    /// Id of the node this change targets.
    #[must_use]
    pub fn target(&self) -> &NodeId {
        match self {
            Self::Add { item } => &item.id,
            Self::Remove { id }
            | Self::Replace { id, .. }
            | Self::Position { id, .. }
            | Self::Dimensions { id, .. }
            | Self::Select { id, .. } => id,
        }
    }
}

/// A targeted mutation of the edge collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EdgeChange {
    /// Append a new edge.
    Add {
        /// The edge to append.
        item: Edge,
    },
    /// Delete an edge by id.
    Remove {
        /// Id of the edge to delete.
        id: EdgeId,
    },
    /// Substitute an edge wholesale.
    Replace {
        /// Id of the edge to replace.
        id: EdgeId,
        /// The replacement.
        item: Edge,
    },
    /// Toggle selection.
    Select {
        /// Id of the edge.
        id: EdgeId,
        /// New selection flag.
        selected: bool,
    },
}

impl EdgeChange {
    /// Id of the edge this change targets.
    #[must_use]
    pub fn target(&self) -> &EdgeId {
        match self {
            Self::Add { item } => &item.id,
            Self::Remove { id } | Self::Replace { id, .. } | Self::Select { id, .. } => id,
        }
    }
}

/// The payload of a change event, tagged with its kind on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangePayload {
    /// Replace the whole node collection.
    BulkNodes(Vec<Node>),
    /// Apply targeted node mutations in order.
    GranularNodes(Vec<NodeChange>),
    /// Replace the whole edge collection.
    BulkEdges(Vec<Edge>),
    /// Apply targeted edge mutations in order.
    GranularEdges(Vec<EdgeChange>),
    /// Move the author's cursor. Never persisted, never validated.
    CursorMove(CursorPosition),
}

impl ChangePayload {
    /// The kind tag of this payload.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::BulkNodes(_) => ChangeKind::BulkNodes,
            Self::GranularNodes(_) => ChangeKind::GranularNodes,
            Self::BulkEdges(_) => ChangeKind::BulkEdges,
            Self::GranularEdges(_) => ChangeKind::GranularEdges,
            Self::CursorMove(_) => ChangeKind::CursorMove,
        }
    }
}

/// Discriminant of a change payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// Wholesale node replacement.
    BulkNodes,
    /// Targeted node mutations.
    GranularNodes,
    /// Wholesale edge replacement.
    BulkEdges,
    /// Targeted edge mutations.
    GranularEdges,
    /// Cursor move.
    CursorMove,
}

impl ChangeKind {
    /// Whether events of this kind reach the durable store.
    ///
    /// Cursor moves ride a fast lane: fanned out immediately, cached
    /// with a short TTL, and dropped from every persistence path.
    #[must_use]
    pub const fn is_persistent(self) -> bool {
        !matches!(self, Self::CursorMove)
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BulkNodes => "BULK_NODES",
            Self::GranularNodes => "GRANULAR_NODES",
            Self::BulkEdges => "BULK_EDGES",
            Self::GranularEdges => "GRANULAR_EDGES",
            Self::CursorMove => "CURSOR_MOVE",
        };
        f.write_str(s)
    }
}

/// A stamped change event flowing through the room pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Room the event belongs to.
    pub room_id: RoomId,
    /// Author of the event.
    pub user_id: UserId,
    /// Server-assigned monotonic timestamp (ms).
    pub timestamp: Timestamp,
    /// The change itself.
    #[serde(flatten)]
    pub payload: ChangePayload,
}

impl ChangeEvent {
    /// The kind tag of this event.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        self.payload.kind()
    }

    /// Whether this event reaches the durable store.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.kind().is_persistent()
    }
}
