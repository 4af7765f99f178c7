//! Convenience re-exports for downstream crates.

pub use crate::change::{
    ChangeEvent, ChangeKind, ChangePayload, EdgeChange, NodeChange, Timestamp,
};
pub use crate::clock::LogicalClock;
pub use crate::flow::{
    CursorPosition, Dimensions, Edge, FlowData, Node, NodeContent, Position, Viewport,
};
pub use crate::id::{EdgeId, NodeId, RoomId, UserId};
pub use crate::participant::{Participant, Principal, Role};
