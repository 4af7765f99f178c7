//! Room registry: creates, hands out, and reaps room controllers.
//!
//! One controller per active room. `join` is the only way a controller
//! comes into existence; controllers remove their own map entry when
//! they reap, and the registry retries a join that raced a reap (the
//! stale handle's mailbox is closed, so the send fails and a fresh
//! controller is spawned).

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use trellis_config::EngineSection;
use trellis_core::{Principal, RoomId};
use trellis_store::{DurableStore, WarmCache};

use crate::access::AccessOracle;
use crate::controller::{RoomController, RoomHandle};
use crate::error::{EngineError, EngineResult};
use crate::transport::SharedTransport;

/// How many times a join retries against a controller that reaped
/// between lookup and send.
const JOIN_RETRIES: usize = 3;

/// The engine-wide map from room id to live controller.
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    store: Arc<dyn DurableStore>,
    cache: Arc<dyn WarmCache>,
    oracle: Arc<dyn AccessOracle>,
    config: EngineSection,
}

impl RoomRegistry {
    /// Build a registry over the given storage tiers and oracle.
    #[must_use]
    pub fn new(
        store: Arc<dyn DurableStore>,
        cache: Arc<dyn WarmCache>,
        oracle: Arc<dyn AccessOracle>,
        config: EngineSection,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms: Arc::new(DashMap::new()),
            store,
            cache,
            oracle,
            config,
        })
    }

    /// Join a principal to a room, spawning its controller on first
    /// access. Returns the handle the connection uses for everything
    /// after the join.
    ///
    /// # Errors
    ///
    /// Propagates the controller's join errors (`AccessDenied`,
    /// `RoomNotFound`, `Timeout`, storage failures).
    pub async fn join(
        &self,
        room_id: RoomId,
        principal: Principal,
        transport: SharedTransport,
    ) -> EngineResult<RoomHandle> {
        for attempt in 0..JOIN_RETRIES {
            let handle = self.get_or_spawn(room_id);
            match handle.join(principal.clone(), transport.clone()).await {
                Err(EngineError::ControllerClosed) => {
                    // Raced a reap: drop the stale entry and respawn.
                    debug!(room = %room_id, attempt, "join raced controller reap, retrying");
                    self.rooms
                        .remove_if(&room_id, |_, h| h.instance() == handle.instance());
                },
                Err(e) => return Err(e),
                Ok(()) => return Ok(handle),
            }
        }
        warn!(room = %room_id, "join kept racing controller reaps");
        Err(EngineError::ControllerClosed)
    }

    fn get_or_spawn(&self, room_id: RoomId) -> RoomHandle {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| {
                RoomController::spawn(
                    room_id,
                    Arc::clone(&self.store),
                    Arc::clone(&self.cache),
                    Arc::clone(&self.oracle),
                    self.config.clone(),
                    Arc::downgrade(&self.rooms),
                )
            })
            .clone()
    }

    /// Number of live room controllers.
    #[must_use]
    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Finalize every room in parallel and wait for all of them.
    /// Called by the shutdown handler; each room's drain is bounded by
    /// the finalization deadline.
    pub async fn finalize_all(&self) {
        let handles: Vec<RoomHandle> = self.rooms.iter().map(|e| e.value().clone()).collect();
        if handles.is_empty() {
            return;
        }
        info!(rooms = handles.len(), "finalizing all rooms");
        futures::future::join_all(handles.iter().map(RoomHandle::finalize)).await;
        info!("all rooms finalized");
    }
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("active_rooms", &self.rooms.len())
            .finish_non_exhaustive()
    }
}
