//! Durable store: the authoritative record of each room's flow data.
//!
//! [`SurrealStore`] wraps an embedded `SurrealDB` connection. In
//! production it runs over `SurrealKV` at a filesystem path; tests use
//! the in-memory engine. [`MemoryStore`] is a plain map for unit and
//! integration tests that also serves as the seeding surface.
//!
//! Room rows are owned by the room-metadata service; the engine only
//! ever reads them and writes the `flow_data` + `updated_at` pair.
//! Single-writer-per-room discipline is guaranteed by controller
//! ownership, so no optimistic locking is used.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::types::SurrealValue;

use trellis_core::{Role, RoomId, UserId};

use crate::error::{StoreError, StoreResult};
use crate::room::RoomRecord;

/// The durable-store surface the engine depends on.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Fetch a room row, or `None` if the room does not exist.
    async fn get_room(&self, room_id: &RoomId) -> StoreResult<Option<RoomRecord>>;

    /// Write a room's flow blob and sync instant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RoomNotFound`] when no row was affected
    /// (the room was deleted out from under the engine).
    async fn update_flow_data(
        &self,
        room_id: &RoomId,
        flow_data: serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Resolve a user's role in a room from the membership table.
    async fn participant_role(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> StoreResult<Option<Role>>;

    /// Look up a user's display name.
    async fn user_name(&self, user_id: &UserId) -> StoreResult<Option<String>>;
}

// ---------------------------------------------------------------------------
// SurrealDB implementation
// ---------------------------------------------------------------------------

/// Room row shape in `SurrealDB`.
///
/// Ids are stored as plain strings and `updated_at` as epoch
/// milliseconds, so rows marshal through serde without engine-specific
/// value types.
#[derive(Debug, Serialize, Deserialize, SurrealValue)]
struct RoomRow {
    room_id: String,
    owner_id: String,
    is_public: bool,
    flow_data: Option<serde_json::Value>,
    updated_at: i64,
}

#[derive(Debug, Deserialize, SurrealValue)]
struct MemberRow {
    #[surreal(wrap)]
    role: Role,
}

#[derive(Debug, Deserialize, SurrealValue)]
struct UserRow {
    name: String,
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// Embedded `SurrealDB` durable store.
pub struct SurrealStore {
    inner: surrealdb::Surreal<surrealdb::engine::any::Any>,
}

impl SurrealStore {
    /// Connect to an embedded `SurrealDB` with `SurrealKV` storage at
    /// the given directory path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the connection fails.
    pub async fn connect_embedded(path: &str) -> StoreResult<Self> {
        Self::connect(&format!("surrealkv://{path}")).await
    }

    /// Connect to an in-memory `SurrealDB` (development and tests).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the connection fails.
    pub async fn connect_memory() -> StoreResult<Self> {
        Self::connect("mem://").await
    }

    async fn connect(endpoint: &str) -> StoreResult<Self> {
        let db: surrealdb::Surreal<surrealdb::engine::any::Any> = surrealdb::Surreal::init();
        db.connect(endpoint)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        db.use_ns("trellis")
            .use_db("main")
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { inner: db })
    }

    fn record_from_row(row: RoomRow) -> StoreResult<RoomRecord> {
        Ok(RoomRecord {
            id: row
                .room_id
                .parse()
                .map_err(|e| StoreError::Serialization(format!("room_id: {e}")))?,
            owner_id: row
                .owner_id
                .parse()
                .map_err(|e| StoreError::Serialization(format!("owner_id: {e}")))?,
            is_public: row.is_public,
            flow_data: row.flow_data,
            updated_at: millis_to_datetime(row.updated_at),
        })
    }
}

impl std::fmt::Debug for SurrealStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrealStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl DurableStore for SurrealStore {
    async fn get_room(&self, room_id: &RoomId) -> StoreResult<Option<RoomRecord>> {
        let mut response = self
            .inner
            .query(
                "SELECT room_id, owner_id, is_public, flow_data, updated_at \
                 FROM room WHERE room_id = $room_id LIMIT 1",
            )
            .bind(("room_id", room_id.to_string()))
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows: Vec<RoomRow> = response
            .take(0)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        rows.into_iter().next().map(Self::record_from_row).transpose()
    }

    async fn update_flow_data(
        &self,
        room_id: &RoomId,
        flow_data: serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut response = self
            .inner
            .query(
                "UPDATE room SET flow_data = $flow_data, updated_at = $updated_at \
                 WHERE room_id = $room_id RETURN AFTER",
            )
            .bind(("flow_data", flow_data))
            .bind(("updated_at", updated_at.timestamp_millis()))
            .bind(("room_id", room_id.to_string()))
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows: Vec<RoomRow> = response
            .take(0)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if rows.is_empty() {
            return Err(StoreError::RoomNotFound(room_id.to_string()));
        }
        Ok(())
    }

    async fn participant_role(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> StoreResult<Option<Role>> {
        let mut response = self
            .inner
            .query(
                "SELECT role FROM room_member \
                 WHERE room_id = $room_id AND user_id = $user_id LIMIT 1",
            )
            .bind(("room_id", room_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows: Vec<MemberRow> = response
            .take(0)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(rows.into_iter().next().map(|r| r.role))
    }

    async fn user_name(&self, user_id: &UserId) -> StoreResult<Option<String>> {
        let mut response = self
            .inner
            .query("SELECT name FROM user WHERE user_id = $user_id LIMIT 1")
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let rows: Vec<UserRow> = response
            .take(0)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(rows.into_iter().next().map(|r| r.name))
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (tests, seeding, fault injection)
// ---------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

/// In-memory durable store for tests.
///
/// Doubles as the seeding surface: integration tests insert rooms,
/// users, and memberships directly, and can inject write failures to
/// exercise the sync retry path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: DashMap<RoomId, RoomRecord>,
    members: DashMap<(RoomId, UserId), Role>,
    users: DashMap<UserId, String>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a room row.
    pub fn insert_room(&self, record: RoomRecord) {
        self.rooms.insert(record.id, record);
    }

    /// Insert a user row.
    pub fn insert_user(&self, user_id: UserId, name: impl Into<String>) {
        self.users.insert(user_id, name.into());
    }

    /// Insert a membership row.
    pub fn insert_member(&self, room_id: RoomId, user_id: UserId, role: Role) {
        self.members.insert((room_id, user_id), role);
    }

    /// Make every subsequent write fail with a query error (fault
    /// injection for retry tests).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Read a room row back (test assertions).
    #[must_use]
    pub fn room(&self, room_id: &RoomId) -> Option<RoomRecord> {
        self.rooms.get(room_id).map(|r| r.clone())
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get_room(&self, room_id: &RoomId) -> StoreResult<Option<RoomRecord>> {
        Ok(self.rooms.get(room_id).map(|r| r.clone()))
    }

    async fn update_flow_data(
        &self,
        room_id: &RoomId,
        flow_data: serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Query("injected write failure".to_owned()));
        }
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))?;
        room.flow_data = Some(flow_data);
        room.updated_at = updated_at;
        Ok(())
    }

    async fn participant_role(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> StoreResult<Option<Role>> {
        Ok(self.members.get(&(*room_id, *user_id)).map(|r| *r))
    }

    async fn user_name(&self, user_id: &UserId) -> StoreResult<Option<String>> {
        Ok(self.users.get(user_id).map(|n| n.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn surreal_store_reads_updates_and_reports_missing_rooms() {
        let store = SurrealStore::connect_memory().await.unwrap();
        let room_id = RoomId::new();
        let owner = UserId::new();

        assert!(store.get_room(&room_id).await.unwrap().is_none());

        store
            .inner
            .query("CREATE room CONTENT $row")
            .bind((
                "row",
                RoomRow {
                    room_id: room_id.to_string(),
                    owner_id: owner.to_string(),
                    is_public: true,
                    flow_data: None,
                    updated_at: 0,
                },
            ))
            .await
            .unwrap();

        let record = store.get_room(&room_id).await.unwrap().unwrap();
        assert_eq!(record.id, room_id);
        assert_eq!(record.owner_id, owner);
        assert!(record.is_public);
        assert!(record.flow_data.is_none());

        let now = Utc::now();
        store
            .update_flow_data(&room_id, serde_json::json!({"nodes": [], "edges": []}), now)
            .await
            .unwrap();
        let record = store.get_room(&room_id).await.unwrap().unwrap();
        assert!(record.flow_data.is_some());
        assert_eq!(record.updated_at.timestamp_millis(), now.timestamp_millis());

        let err = store
            .update_flow_data(&RoomId::new(), serde_json::json!({}), now)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn surreal_store_resolves_membership_rows() {
        let store = SurrealStore::connect_memory().await.unwrap();
        let room_id = RoomId::new();
        let user = UserId::new();

        store
            .inner
            .query("CREATE room_member SET room_id = $room_id, user_id = $user_id, role = $role")
            .bind(("room_id", room_id.to_string()))
            .bind(("user_id", user.to_string()))
            .bind(("role", Role::Editor))
            .await
            .unwrap();
        store
            .inner
            .query("CREATE user SET user_id = $user_id, name = $name")
            .bind(("user_id", user.to_string()))
            .bind(("name", "ada"))
            .await
            .unwrap();

        assert_eq!(
            store.participant_role(&room_id, &user).await.unwrap(),
            Some(Role::Editor)
        );
        assert_eq!(
            store.participant_role(&room_id, &UserId::new()).await.unwrap(),
            None
        );
        assert_eq!(store.user_name(&user).await.unwrap().as_deref(), Some("ada"));
    }

    fn record(room_id: RoomId, owner: UserId) -> RoomRecord {
        RoomRecord {
            id: room_id,
            owner_id: owner,
            is_public: false,
            flow_data: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_store_roundtrips_a_room() {
        let store = MemoryStore::new();
        let room_id = RoomId::new();
        let owner = UserId::new();
        store.insert_room(record(room_id, owner));

        let loaded = store.get_room(&room_id).await.unwrap().unwrap();
        assert_eq!(loaded.owner_id, owner);
        assert!(store.get_room(&RoomId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_missing_room_reports_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_flow_data(&RoomId::new(), serde_json::json!({}), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn injected_failures_surface_as_query_errors() {
        let store = MemoryStore::new();
        let room_id = RoomId::new();
        store.insert_room(record(room_id, UserId::new()));
        store.set_fail_writes(true);

        let err = store
            .update_flow_data(&room_id, serde_json::json!({}), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));

        store.set_fail_writes(false);
        store
            .update_flow_data(&room_id, serde_json::json!({}), Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn membership_and_user_lookups() {
        let store = MemoryStore::new();
        let room_id = RoomId::new();
        let user = UserId::new();
        store.insert_user(user, "ada");
        store.insert_member(room_id, user, Role::Editor);

        assert_eq!(
            store.participant_role(&room_id, &user).await.unwrap(),
            Some(Role::Editor)
        );
        assert_eq!(store.user_name(&user).await.unwrap().as_deref(), Some("ada"));
        assert_eq!(
            store.participant_role(&room_id, &UserId::new()).await.unwrap(),
            None
        );
    }
}
