//! Trellis Gateway — the WebSocket edge of the collaboration engine.
//!
//! One session task per socket. A session authenticates the first
//! `JOIN_ROOM` through the access oracle, hands the engine a transport
//! that preserves per-socket FIFO, then routes changes and cursor
//! moves into the room's controller. The server pings on an interval
//! and drops connections that go silent past the timeout; reconnection
//! is client-initiated and always starts with a fresh join.

#![deny(missing_docs)]
#![warn(unreachable_pub)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod server;
mod session;

pub use error::{GatewayError, GatewayResult};
pub use server::Gateway;
