//! Shared fixtures for the engine integration tests: an in-memory
//! engine stack with fast timers and a recording transport.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use trellis_config::EngineSection;
use trellis_core::{FlowData, Principal, Role, RoomId, UserId};
use trellis_engine::{ParticipantTransport, RoomRegistry, StoreAccessOracle, TransportClosed};
use trellis_protocol::ServerMessage;
use trellis_store::{MemoryStore, MemoryWarmCache, RoomRecord};

/// Transport that records everything the engine sends to one client.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    messages: Mutex<Vec<ServerMessage>>,
    closed: std::sync::atomic::AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate the socket dying: every later send fails.
    pub fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<ServerMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn flow_changes(&self) -> Vec<ServerMessage> {
        self.messages()
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::FlowChange { .. }))
            .collect()
    }

    pub fn conflicts(&self) -> Vec<ServerMessage> {
        self.messages()
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::OperationConflict { .. }))
            .collect()
    }
}

impl ParticipantTransport for RecordingTransport {
    fn send(&self, message: ServerMessage) -> Result<(), TransportClosed> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(TransportClosed);
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

/// A complete in-memory engine with one seeded room.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryWarmCache>,
    pub registry: Arc<RoomRegistry>,
    pub room_id: RoomId,
    pub owner: UserId,
}

/// Timers fast enough for tests: 40 ms broadcast, 120 ms sync,
/// 40 ms retry with no jitter.
pub fn fast_engine_config() -> EngineSection {
    let mut config = EngineSection::default();
    config.broadcast_debounce_ms = 40;
    config.sync_debounce_ms = 120;
    config.sync_retry.initial_ms = 40;
    config.sync_retry.max_ms = 200;
    config.sync_retry.jitter_pct = 0;
    config.finalization_deadline_ms = 2_000;
    config
}

pub fn fixture_with(config: EngineSection, flow: Option<FlowData>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let room_id = RoomId::new();
    let owner = UserId::new();
    store.insert_room(RoomRecord {
        id: room_id,
        owner_id: owner,
        is_public: false,
        flow_data: flow.map(|f| f.to_stored()),
        updated_at: Utc::now(),
    });
    store.insert_user(owner, "owner");

    let cache = Arc::new(MemoryWarmCache::with_defaults());
    let oracle = Arc::new(StoreAccessOracle::new(store.clone() as _));
    let registry = RoomRegistry::new(store.clone() as _, cache.clone() as _, oracle, config);

    Fixture {
        store,
        cache,
        registry,
        room_id,
        owner,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(fast_engine_config(), None)
}

impl Fixture {
    /// Register an editor in the room and return their principal.
    pub fn editor(&self, name: &str) -> Principal {
        let user_id = UserId::new();
        self.store.insert_user(user_id, name);
        self.store.insert_member(self.room_id, user_id, Role::Editor);
        Principal {
            user_id,
            name: name.to_string(),
        }
    }

    /// Register a viewer in the room and return their principal.
    pub fn viewer(&self, name: &str) -> Principal {
        let user_id = UserId::new();
        self.store.insert_user(user_id, name);
        self.store.insert_member(self.room_id, user_id, Role::Viewer);
        Principal {
            user_id,
            name: name.to_string(),
        }
    }

    /// The flow currently persisted in the durable store.
    pub fn stored_flow(&self) -> FlowData {
        let record = self.store.room(&self.room_id).expect("room row");
        FlowData::from_stored(record.flow_data)
    }
}

/// Poll until the predicate holds or the timeout passes.
pub async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
