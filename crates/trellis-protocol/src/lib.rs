//! Trellis wire protocol.
//!
//! Every frame on the transport is one typed JSON envelope, tagged with
//! `type`. Clients send [`ClientMessage`]; the server sends
//! [`ServerMessage`]. Framing is the transport's concern
//! (`trellis-gateway` uses WebSocket text frames); this crate is pure
//! serde types plus the conflict-reason vocabulary.

#![deny(missing_docs)]
#![warn(unreachable_pub)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod conflict;
pub mod message;

pub use conflict::{ConflictNotice, ConflictReason};
pub use message::{ClientMessage, ServerMessage};
