//! Trellis Core — domain types for the room collaboration engine.
//!
//! A *room* is the collaboration boundary: one shared flow document
//! (ordered nodes + ordered edges) and one participant set. Everything a
//! client can do to the document is expressed as a [`ChangeEvent`], a
//! tagged sum over bulk replacements, granular mutations, and cursor
//! moves. Events are stamped by the owning room's [`LogicalClock`] so the
//! applied sequence is strictly increasing per room.
//!
//! This crate is pure data: no I/O, no async, no engine logic. The
//! validator and consolidator in `trellis-engine` consume these types;
//! `trellis-protocol` wraps them into wire envelopes.

#![deny(missing_docs)]
#![warn(unreachable_pub)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod change;
pub mod clock;
pub mod flow;
pub mod id;
pub mod participant;
pub mod prelude;

pub use change::{ChangeEvent, ChangeKind, ChangePayload, EdgeChange, NodeChange, Timestamp};
pub use clock::LogicalClock;
pub use flow::{CursorPosition, Dimensions, Edge, FlowData, Node, NodeContent, Position, Viewport};
pub use id::{EdgeId, NodeId, RoomId, UserId};
pub use participant::{Participant, Principal, Role};
