//! Warm cache: the hot source of truth between durable syncs.
//!
//! Keyed by room id. Holds the latest materialized flow data, the
//! per-room pending-change list (the durable-enough hot buffer that
//! survives a controller crash when the cache is remote), and short-TTL
//! cursor positions. The trait is the seam for a shared cache in
//! clustered deployments; [`MemoryWarmCache`] is the in-process
//! implementation.
//!
//! Single-writer per key: a room's entries are only written by the
//! room's owning controller. Pending-list append and drain are atomic
//! under the entry lock.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use trellis_core::{ChangeEvent, CursorPosition, FlowData, RoomId, Timestamp, UserId};

use crate::error::StoreResult;

/// A cached room: materialized flow data plus the last durable sync.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRoom {
    /// Latest materialized document. Always at least as recent as the
    /// durable store's copy.
    pub flow_data: FlowData,
    /// Instant of the last durable write.
    pub last_synced_at: DateTime<Utc>,
}

/// The warm-cache surface the engine depends on.
#[async_trait]
pub trait WarmCache: Send + Sync {
    /// Fetch a room's cached state.
    async fn get(&self, room_id: &RoomId) -> StoreResult<Option<CachedRoom>>;

    /// Store a room's state, refreshing its TTL.
    async fn put(&self, room_id: &RoomId, room: CachedRoom) -> StoreResult<()>;

    /// Append an event to the room's pending-change list.
    async fn append_pending(&self, room_id: &RoomId, event: ChangeEvent) -> StoreResult<()>;

    /// Atomically take and clear the room's pending-change list.
    async fn get_and_clear_pending(&self, room_id: &RoomId) -> StoreResult<Vec<ChangeEvent>>;

    /// Drop pending entries with timestamps at or below `through`.
    async fn clear_pending_through(&self, room_id: &RoomId, through: Timestamp) -> StoreResult<()>;

    /// Whether the room has pending entries.
    async fn has_pending(&self, room_id: &RoomId) -> StoreResult<bool>;

    /// Record a participant's cursor with a short TTL.
    async fn update_cursor(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        cursor: CursorPosition,
    ) -> StoreResult<()>;

    /// Drop every entry for the room (controller reap).
    async fn remove(&self, room_id: &RoomId) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// In-process implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-process warm cache over [`DashMap`], with lazy TTL eviction.
#[derive(Debug)]
pub struct MemoryWarmCache {
    rooms: DashMap<RoomId, Expiring<CachedRoom>>,
    pending: DashMap<RoomId, Vec<ChangeEvent>>,
    cursors: DashMap<(RoomId, UserId), Expiring<CursorPosition>>,
    room_ttl: Duration,
    cursor_ttl: Duration,
}

impl MemoryWarmCache {
    /// Create a cache with the given TTLs.
    #[must_use]
    pub fn new(room_ttl: Duration, cursor_ttl: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            pending: DashMap::new(),
            cursors: DashMap::new(),
            room_ttl,
            cursor_ttl,
        }
    }

    /// Production defaults: 24 h room TTL, 30 s cursor TTL.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(86_400), Duration::from_secs(30))
    }

    /// A participant's live cursor, if it has not expired.
    #[must_use]
    pub fn cursor(&self, room_id: &RoomId, user_id: &UserId) -> Option<CursorPosition> {
        let key = (*room_id, *user_id);
        if let Some(entry) = self.cursors.get(&key)
            && entry.live()
        {
            return Some(entry.value);
        }
        // Expired or absent. The guard is released before the removal.
        self.cursors.remove_if(&key, |_, entry| !entry.live());
        None
    }
}

#[async_trait]
impl WarmCache for MemoryWarmCache {
    async fn get(&self, room_id: &RoomId) -> StoreResult<Option<CachedRoom>> {
        if let Some(entry) = self.rooms.get(room_id)
            && entry.live()
        {
            return Ok(Some(entry.value.clone()));
        }
        // Expired or absent. The guard is released before the removal.
        self.rooms.remove_if(room_id, |_, entry| !entry.live());
        Ok(None)
    }

    async fn put(&self, room_id: &RoomId, room: CachedRoom) -> StoreResult<()> {
        self.rooms.insert(*room_id, Expiring::new(room, self.room_ttl));
        Ok(())
    }

    async fn append_pending(&self, room_id: &RoomId, event: ChangeEvent) -> StoreResult<()> {
        self.pending.entry(*room_id).or_default().push(event);
        Ok(())
    }

    async fn get_and_clear_pending(&self, room_id: &RoomId) -> StoreResult<Vec<ChangeEvent>> {
        Ok(self.pending.remove(room_id).map(|(_, v)| v).unwrap_or_default())
    }

    async fn clear_pending_through(&self, room_id: &RoomId, through: Timestamp) -> StoreResult<()> {
        if let Some(mut entry) = self.pending.get_mut(room_id) {
            entry.retain(|e| e.timestamp > through);
        }
        Ok(())
    }

    async fn has_pending(&self, room_id: &RoomId) -> StoreResult<bool> {
        Ok(self.pending.get(room_id).is_some_and(|v| !v.is_empty()))
    }

    async fn update_cursor(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        cursor: CursorPosition,
    ) -> StoreResult<()> {
        self.cursors
            .insert((*room_id, *user_id), Expiring::new(cursor, self.cursor_ttl));
        Ok(())
    }

    async fn remove(&self, room_id: &RoomId) -> StoreResult<()> {
        self.rooms.remove(room_id);
        self.pending.remove(room_id);
        self.cursors.retain(|(r, _), _| r != room_id);
        Ok(())
    }
}
