//! Trellis Store — the two storage tiers behind the room engine.
//!
//! # Durable Store ([`DurableStore`])
//!
//! Authoritative record of each room's flow data, backed by embedded
//! `SurrealDB` over `SurrealKV` ([`SurrealStore`]) or an in-memory map
//! for tests ([`MemoryStore`]). The engine reads a room on cold start
//! and writes `flow_data` + `updated_at` on debounced sync — nothing
//! else in the schema belongs to the engine.
//!
//! # Warm Cache ([`WarmCache`])
//!
//! Hot source of truth between syncs, keyed by room id: the latest
//! materialized flow data, a per-room pending-change list, and
//! short-TTL cursor positions. [`MemoryWarmCache`] is the in-process
//! implementation; the trait is the seam for a shared cache in
//! clustered deployments. Writes to a room's entries come only from the
//! room's owning controller (single-writer per key).

#![deny(missing_docs)]
#![warn(unreachable_pub)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cache;
pub mod db;
pub mod error;
pub mod room;

pub use cache::{CachedRoom, MemoryWarmCache, WarmCache};
pub use db::{DurableStore, MemoryStore, SurrealStore};
pub use error::{StoreError, StoreResult};
pub use room::RoomRecord;
