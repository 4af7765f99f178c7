//! Trellis Engine — the room collaboration core.
//!
//! One room controller per active room, running as a serial executor:
//! a dedicated task with a mailbox. Every mutation of
//! room state — participants, queues, timers, the hot document — goes
//! through that task, which is the single writer for the room across
//! the cluster. Rooms run in parallel; within a room execution is
//! cooperative and ordered.
//!
//! The mutation pipeline has three tiers:
//!
//! 1. **ingest** — stamp with the room's logical clock, validate
//!    against the hot document, reject conflicts back to the author,
//!    buffer accepted events;
//! 2. **broadcast** — a debounced timer consolidates the buffered batch
//!    and fans it out to every participant;
//! 3. **sync** — a slower debounced timer validates, consolidates, and
//!    applies the batch to the cached document, then writes it
//!    durably with bounded retry.
//!
//! Cursor moves ride a dedicated fast lane past both queues.
//! Finalization drains everything — including warm-cache pending lists
//! the engine never dequeued — before a room's resources are released.

#![deny(missing_docs)]
#![warn(unreachable_pub)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod access;
pub mod apply;
mod backoff;
pub mod consolidate;
pub mod controller;
pub mod error;
pub mod registry;
pub mod transport;
pub mod validate;

pub use access::{AccessOracle, StoreAccessOracle};
pub use controller::RoomHandle;
pub use error::{EngineError, EngineResult};
pub use registry::RoomRegistry;
pub use transport::{ParticipantTransport, SharedTransport, TransportClosed};
