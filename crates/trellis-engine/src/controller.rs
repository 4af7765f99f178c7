//! The room controller: one serial executor per active room.
//!
//! A controller is a task with a mailbox. Joins, leaves, ingests,
//! cursor moves, and finalization all arrive as [`Command`]s; the two
//! debounce timers are `select!` arms over single-shot deadlines,
//! re-armed only when the next event arrives. Every piece of room
//! state — participants, the hot document, both queues, the logical
//! clock — is owned by the task, so there is no locking within a room.
//!
//! Blocking work (store and cache calls) suspends the task; commands
//! sent meanwhile wait in the mailbox and are stamped only at dequeue,
//! which keeps the per-room timestamp order intact.
//!
//! # Locking design
//!
//! The registry's handle map is the only shared structure. A handle is
//! a clone-cheap sender; the controller holds a weak reference back to
//! the map purely to remove its own entry on reap.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use trellis_config::EngineSection;
use trellis_core::{
    ChangeEvent, ChangePayload, CursorPosition, FlowData, LogicalClock, Participant, Principal,
    RoomId, Timestamp, UserId,
};
use trellis_protocol::{ConflictNotice, ServerMessage};
use trellis_store::{CachedRoom, DurableStore, WarmCache};

use crate::access::AccessOracle;
use crate::apply::apply_event;
use crate::backoff::Backoff;
use crate::consolidate::{consolidate, sort_by_timestamp};
use crate::error::{EngineError, EngineResult};
use crate::transport::SharedTransport;
use crate::validate::validate_batch;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Commands accepted by a room controller's mailbox.
pub(crate) enum Command {
    /// Add a participant and deliver the join snapshot.
    Join {
        principal: Principal,
        transport: SharedTransport,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    /// Remove a participant. Idempotent.
    Leave { user_id: UserId },
    /// A document mutation from a participant.
    Ingest {
        user_id: UserId,
        payload: ChangePayload,
    },
    /// A cursor move from a participant (fast lane).
    Cursor {
        user_id: UserId,
        cursor: CursorPosition,
    },
    /// Drain everything and shut the controller down.
    Finalize { reply: oneshot::Sender<()> },
}

/// Clone-cheap handle to a room controller.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    room_id: RoomId,
    instance: u64,
    tx: mpsc::UnboundedSender<Command>,
}

impl RoomHandle {
    /// The room this handle addresses.
    #[must_use]
    pub const fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Whether the controller behind this handle has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) const fn instance(&self) -> u64 {
        self.instance
    }

    /// Join the room: gate through the access oracle, load the
    /// document, deliver `ROOM_JOINED` to the given transport, and
    /// announce the participant to peers.
    ///
    /// # Errors
    ///
    /// `AccessDenied`, `RoomNotFound`, `Timeout`, storage errors, or
    /// `ControllerClosed` when the room reaped concurrently (callers
    /// retry through the registry).
    pub async fn join(
        &self,
        principal: Principal,
        transport: SharedTransport,
    ) -> EngineResult<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Join {
                principal,
                transport,
                reply,
            })
            .map_err(|_| EngineError::ControllerClosed)?;
        rx.await.map_err(|_| EngineError::ControllerClosed)?
    }

    /// Remove a participant. Fire-and-forget; idempotent.
    pub fn leave(&self, user_id: UserId) {
        let _ = self.tx.send(Command::Leave { user_id });
    }

    /// Submit a document mutation.
    pub fn ingest(&self, user_id: UserId, payload: ChangePayload) {
        let _ = self.tx.send(Command::Ingest { user_id, payload });
    }

    /// Submit a cursor move.
    pub fn cursor(&self, user_id: UserId, cursor: CursorPosition) {
        let _ = self.tx.send(Command::Cursor { user_id, cursor });
    }

    /// Drain all queues and stop the controller. Resolves when every
    /// queued mutation has been persisted (or the deadline passed).
    pub async fn finalize(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Finalize { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

/// A participant's seat: identity plus their outbound transport.
struct Seat {
    participant: Participant,
    transport: SharedTransport,
}

enum Flow {
    Continue,
    Shutdown,
}

/// The per-room serial executor.
pub(crate) struct RoomController {
    room_id: RoomId,
    instance: u64,
    rx: mpsc::UnboundedReceiver<Command>,
    store: Arc<dyn DurableStore>,
    cache: Arc<dyn WarmCache>,
    oracle: Arc<dyn AccessOracle>,
    config: EngineSection,
    /// Registry map, for self-removal on reap.
    rooms: Weak<DashMap<RoomId, RoomHandle>>,

    /// Hot document. `None` until the first successful load.
    doc: Option<FlowData>,
    clock: LogicalClock,
    participants: HashMap<UserId, Seat>,
    broadcast_queue: Vec<ChangeEvent>,
    sync_queue: Vec<ChangeEvent>,
    broadcast_deadline: Option<Instant>,
    sync_deadline: Option<Instant>,
    sync_backoff: Backoff,
    sync_failing_since: Option<Instant>,
    degraded: bool,
    /// Set once the first join has been processed; gates reaping.
    served: bool,
}

impl RoomController {
    /// Spawn a controller task and return its handle.
    pub(crate) fn spawn(
        room_id: RoomId,
        store: Arc<dyn DurableStore>,
        cache: Arc<dyn WarmCache>,
        oracle: Arc<dyn AccessOracle>,
        config: EngineSection,
        rooms: Weak<DashMap<RoomId, RoomHandle>>,
    ) -> RoomHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let sync_backoff = Backoff::new(
            config.sync_retry.initial_ms,
            config.sync_retry.max_ms,
            config.sync_retry.jitter_pct,
        );
        let controller = Self {
            room_id,
            instance,
            rx,
            store,
            cache,
            oracle,
            config,
            rooms,
            doc: None,
            clock: LogicalClock::new(),
            participants: HashMap::new(),
            broadcast_queue: Vec::new(),
            sync_queue: Vec::new(),
            broadcast_deadline: None,
            sync_deadline: None,
            sync_backoff,
            sync_failing_since: None,
            degraded: false,
            served: false,
        };
        tokio::spawn(controller.run());
        RoomHandle {
            room_id,
            instance,
            tx,
        }
    }

    async fn run(mut self) {
        debug!(room = %self.room_id, instance = self.instance, "room controller started");
        loop {
            tokio::select! {
                biased;
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if matches!(self.handle(cmd).await, Flow::Shutdown) {
                                break;
                            }
                        },
                        None => {
                            // Every handle dropped: drain and stop.
                            self.finalize().await;
                            break;
                        },
                    }
                },
                () = sleep_until_opt(self.broadcast_deadline),
                        if self.broadcast_deadline.is_some() => {
                    self.broadcast_deadline = None;
                    self.flush_broadcast();
                },
                () = sleep_until_opt(self.sync_deadline),
                        if self.sync_deadline.is_some() => {
                    self.sync_deadline = None;
                    self.flush_sync().await;
                },
            }

            if self.served && self.participants.is_empty() && self.drain_then_reap().await {
                break;
            }
        }
        self.remove_registry_entry();
        info!(room = %self.room_id, instance = self.instance, "room controller stopped");
    }

    async fn handle(&mut self, cmd: Command) -> Flow {
        match cmd {
            Command::Join {
                principal,
                transport,
                reply,
            } => {
                let result = self.join(principal, transport).await;
                self.served = true;
                let _ = reply.send(result);
                Flow::Continue
            },
            Command::Leave { user_id } => {
                self.leave(&user_id);
                Flow::Continue
            },
            Command::Ingest { user_id, payload } => {
                self.ingest(user_id, payload).await;
                Flow::Continue
            },
            Command::Cursor { user_id, cursor } => {
                self.cursor_move(user_id, cursor).await;
                Flow::Continue
            },
            Command::Finalize { reply } => {
                self.finalize().await;
                let _ = reply.send(());
                Flow::Shutdown
            },
        }
    }

    // -- join / leave -----------------------------------------------------

    async fn join(
        &mut self,
        principal: Principal,
        transport: SharedTransport,
    ) -> EngineResult<()> {
        let budget = self.config.join_timeout();
        let budget_ms = self.config.join_timeout_ms;
        let timed_out = move || EngineError::Timeout {
            operation: "join",
            ms: budget_ms,
        };

        let role = tokio::time::timeout(
            budget,
            self.oracle.role_in(&self.room_id, &principal.user_id),
        )
        .await
        .map_err(|_| timed_out())??
        .ok_or(EngineError::AccessDenied)?;

        if self.doc.is_none() {
            match tokio::time::timeout(budget, self.load_room()).await {
                Ok(Ok(flow)) => self.doc = Some(flow),
                Ok(Err(EngineError::RoomNotFound)) => {
                    // Purge any stale cached state for the deleted room.
                    let _ = self.cache.remove(&self.room_id).await;
                    return Err(EngineError::RoomNotFound);
                },
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(timed_out()),
            }
        }

        let flow_data = self.doc.clone().unwrap_or_default();
        let peers: Vec<Participant> = self
            .participants
            .values()
            .filter(|s| s.participant.user_id != principal.user_id)
            .map(|s| s.participant.clone())
            .collect();

        let participant = Participant::new(principal, role);
        let user_id = participant.user_id;
        transport
            .send(ServerMessage::RoomJoined {
                room_id: self.room_id,
                flow_data,
                participants: peers,
                user_role: role,
            })
            .map_err(|_| EngineError::TransportClosed)?;

        // A rejoin over a fresh socket replaces the old seat silently.
        let rejoined = self
            .participants
            .insert(
                user_id,
                Seat {
                    participant: participant.clone(),
                    transport,
                },
            )
            .is_some();
        if !rejoined {
            self.fan_out(Some(&user_id), &ServerMessage::ParticipantJoined { participant });
        }
        info!(room = %self.room_id, %user_id, ?role, rejoined, "participant joined");
        Ok(())
    }

    fn leave(&mut self, user_id: &UserId) {
        if self.participants.remove(user_id).is_some() {
            info!(room = %self.room_id, %user_id, "participant left");
            self.fan_out(None, &ServerMessage::ParticipantLeft { user_id: *user_id });
        }
    }

    /// Load the room: warm cache first, durable store on miss, then
    /// fold in any orphaned pending changes (crash recovery).
    async fn load_room(&mut self) -> EngineResult<FlowData> {
        let (mut flow, last_synced_at) = match self.cache.get(&self.room_id).await? {
            Some(cached) => {
                trace!(room = %self.room_id, "room loaded from warm cache");
                (cached.flow_data, cached.last_synced_at)
            },
            None => {
                let record = self
                    .store
                    .get_room(&self.room_id)
                    .await?
                    .ok_or(EngineError::RoomNotFound)?;
                let flow = record.flow();
                self.cache
                    .put(
                        &self.room_id,
                        CachedRoom {
                            flow_data: flow.clone(),
                            last_synced_at: record.updated_at,
                        },
                    )
                    .await?;
                debug!(room = %self.room_id, "room loaded from durable store");
                (flow, record.updated_at)
            },
        };

        let mut resume_ts = last_synced_at.timestamp_millis();

        // Changes a previous instance accepted but never synced: apply
        // them to the snapshot and queue them for this instance's sync.
        let mut orphaned = self.cache.get_and_clear_pending(&self.room_id).await?;
        if !orphaned.is_empty() {
            sort_by_timestamp(&mut orphaned);
            let batch = validate_batch(&flow, orphaned);
            warn!(
                room = %self.room_id,
                recovered = batch.accepted.len(),
                dropped = batch.rejected.len(),
                "recovered pending changes from warm cache"
            );
            flow = batch.state;
            for event in batch.accepted {
                resume_ts = resume_ts.max(event.timestamp);
                self.cache.append_pending(&self.room_id, event.clone()).await?;
                self.sync_queue.push(event);
            }
            if self.sync_deadline.is_none() && !self.sync_queue.is_empty() {
                self.sync_deadline = Some(Instant::now() + self.config.sync_debounce());
            }
        }

        self.clock = LogicalClock::resume_from(resume_ts.max(self.clock.last()));
        Ok(flow)
    }

    // -- mutation pipeline ------------------------------------------------

    async fn ingest(&mut self, user_id: UserId, payload: ChangePayload) {
        // A cursor payload routed through the change path still takes
        // the fast lane; it must never reach the queues.
        if let ChangePayload::CursorMove(cursor) = &payload {
            let cursor = *cursor;
            self.cursor_move(user_id, cursor).await;
            return;
        }

        let Some(seat) = self.participants.get_mut(&user_id) else {
            warn!(room = %self.room_id, %user_id, "change from non-participant dropped");
            return;
        };
        seat.participant.touch();
        if !seat.participant.role.may_edit() {
            debug!(room = %self.room_id, %user_id, "viewer change refused");
            let _ = seat
                .transport
                .send(ServerMessage::error("viewers cannot modify the document"));
            return;
        }

        let timestamp = self.clock.stamp();
        let event = ChangeEvent {
            room_id: self.room_id,
            user_id,
            timestamp,
            payload,
        };

        let Some(doc) = self.doc.as_mut() else {
            warn!(room = %self.room_id, "change before load dropped");
            return;
        };
        if let Err(reason) = apply_event(doc, &event) {
            let kind = event.kind();
            info!(
                target: "trellis_engine::conflict",
                room = %self.room_id,
                user = %user_id,
                %kind,
                %reason,
                timestamp,
                "change rejected"
            );
            self.notify_conflict(&user_id, ConflictNotice::new(kind, timestamp, reason));
            return;
        }
        trace!(room = %self.room_id, %user_id, kind = %event.kind(), timestamp, "change accepted");

        if let Err(e) = self.cache.append_pending(&self.room_id, event.clone()).await {
            // The in-memory queues still hold the event; sync will
            // persist it even though the hot buffer missed it.
            warn!(room = %self.room_id, error = %e, "warm cache append failed");
        }
        self.broadcast_queue.push(event.clone());
        self.sync_queue.push(event);

        let now = Instant::now();
        if self.broadcast_deadline.is_none() {
            self.broadcast_deadline = Some(now + self.config.broadcast_debounce());
        }
        if self.sync_deadline.is_none() {
            self.sync_deadline = Some(now + self.config.sync_debounce());
        }
    }

    async fn cursor_move(&mut self, user_id: UserId, cursor: CursorPosition) {
        let Some(seat) = self.participants.get_mut(&user_id) else {
            return;
        };
        seat.participant.cursor = Some(cursor);
        seat.participant.touch();

        if let Err(e) = self.cache.update_cursor(&self.room_id, &user_id, cursor).await {
            trace!(room = %self.room_id, error = %e, "cursor cache write failed");
        }
        self.fan_out(Some(&user_id), &ServerMessage::CursorMove { user_id, cursor });
    }

    /// Broadcast timer fired: consolidate the window and fan it out.
    fn flush_broadcast(&mut self) {
        if self.broadcast_queue.is_empty() {
            return;
        }
        let mut batch = std::mem::take(&mut self.broadcast_queue);
        sort_by_timestamp(&mut batch);
        let consolidated = consolidate(batch, true);
        debug!(
            room = %self.room_id,
            events = consolidated.len(),
            participants = self.participants.len(),
            "broadcasting consolidated batch"
        );
        for event in consolidated {
            self.fan_out(None, &ServerMessage::FlowChange { event });
        }
    }

    /// Sync timer fired: persist the window, backing off on failure.
    async fn flush_sync(&mut self) {
        if self.sync_queue.is_empty() {
            return;
        }
        match self.try_sync().await {
            Ok(()) => {
                self.sync_backoff.reset();
                self.sync_failing_since = None;
                if self.degraded {
                    info!(room = %self.room_id, "room recovered from degraded state");
                    self.degraded = false;
                }
            },
            Err(EngineError::RoomNotFound) => {
                // The room row vanished while we were serving it.
                // There is nowhere left to persist; drop the batch.
                error!(
                    room = %self.room_id,
                    discarded = self.sync_queue.len(),
                    "room deleted externally, discarding queued changes"
                );
                self.sync_queue.clear();
                let _ = self.cache.remove(&self.room_id).await;
            },
            Err(e) => {
                let delay = self.sync_backoff.next_delay();
                warn!(
                    room = %self.room_id,
                    error = %e,
                    attempts = self.sync_backoff.attempts(),
                    retry_in_ms = delay.as_millis() as u64,
                    "durable sync failed, retrying"
                );
                self.sync_deadline = Some(Instant::now() + delay);
                let failing_since = *self.sync_failing_since.get_or_insert_with(Instant::now);
                if !self.degraded
                    && failing_since.elapsed() >= self.config.finalization_deadline()
                {
                    self.degraded = true;
                    error!(
                        room = %self.room_id,
                        pending = self.sync_queue.len(),
                        "room degraded: durable sync failing past deadline"
                    );
                }
            },
        }
    }

    /// One sync attempt over the whole queue. The queue is cleared only
    /// after the durable write lands; failure keeps every event.
    async fn try_sync(&mut self) -> EngineResult<()> {
        let base = match self.cache.get(&self.room_id).await? {
            Some(cached) => cached.flow_data,
            None => self
                .store
                .get_room(&self.room_id)
                .await?
                .ok_or(EngineError::RoomNotFound)?
                .flow(),
        };

        let mut batch = self.sync_queue.clone();
        sort_by_timestamp(&mut batch);
        let Some(highest) = batch.last().map(|e| e.timestamp) else {
            return Ok(());
        };

        let validated = validate_batch(&base, batch);
        for rejection in &validated.rejected {
            // Ingest already vetted these against the hot document; a
            // rejection here means the shared cache snapshot diverged.
            info!(
                target: "trellis_engine::conflict",
                room = %self.room_id,
                user = %rejection.event.user_id,
                kind = %rejection.event.kind(),
                reason = %rejection.reason,
                "change rejected at sync"
            );
            self.notify_conflict(
                &rejection.event.user_id,
                ConflictNotice::new(
                    rejection.event.kind(),
                    rejection.event.timestamp,
                    rejection.reason,
                ),
            );
        }

        let consolidated = consolidate(validated.accepted, true);
        let mut flow = base;
        for event in &consolidated {
            if let Err(reason) = apply_event(&mut flow, event) {
                // Consolidation can drop a bulk in favour of later
                // granulars; re-applying those to the pre-bulk snapshot
                // may miss targets. Observable source behaviour.
                warn!(
                    room = %self.room_id,
                    kind = %event.kind(),
                    %reason,
                    "consolidated event skipped during apply"
                );
            }
        }

        let synced_at = Utc::now();
        let count = self.sync_queue.len();
        self.store
            .update_flow_data(&self.room_id, flow.to_stored(), synced_at)
            .await?;
        self.cache
            .put(
                &self.room_id,
                CachedRoom {
                    flow_data: flow,
                    last_synced_at: synced_at,
                },
            )
            .await?;
        self.cache.clear_pending_through(&self.room_id, highest).await?;
        self.sync_queue.clear();
        debug!(room = %self.room_id, events = count, "durable sync complete");
        Ok(())
    }

    // -- finalization -----------------------------------------------------

    /// Drain both pipelines and the warm-cache pending list, then
    /// persist under the finalization deadline.
    async fn finalize(&mut self) {
        info!(
            room = %self.room_id,
            broadcast = self.broadcast_queue.len(),
            sync = self.sync_queue.len(),
            "finalizing room"
        );
        self.broadcast_deadline = None;
        self.sync_deadline = None;

        // 1. Broadcast drain. Fan-out may reach nobody; that is fine.
        self.flush_broadcast();

        // 2. Fold in events that reached the warm cache but never this
        //    queue (a crashed predecessor, or an append raced past a
        //    drain), restoring the hot buffer immediately so a failed
        //    write below cannot lose them.
        match self.cache.get_and_clear_pending(&self.room_id).await {
            Ok(pending) if !pending.is_empty() => {
                let known: HashSet<Timestamp> =
                    self.sync_queue.iter().map(|e| e.timestamp).collect();
                for event in &pending {
                    if !known.contains(&event.timestamp) {
                        self.sync_queue.push(event.clone());
                    }
                }
                for event in pending {
                    let _ = self.cache.append_pending(&self.room_id, event).await;
                }
            },
            Ok(_) => {},
            Err(e) => {
                warn!(room = %self.room_id, error = %e, "pending drain failed during finalize");
            },
        }

        if self.sync_queue.is_empty() {
            return;
        }

        // 3. Persist with bounded retry.
        let deadline = Instant::now() + self.config.finalization_deadline();
        let mut backoff = Backoff::new(
            self.config.sync_retry.initial_ms,
            self.config.sync_retry.max_ms,
            self.config.sync_retry.jitter_pct,
        );
        loop {
            match self.try_sync().await {
                Ok(()) => {
                    debug!(room = %self.room_id, "finalization persisted all queued changes");
                    return;
                },
                Err(EngineError::RoomNotFound) => {
                    error!(
                        room = %self.room_id,
                        discarded = self.sync_queue.len(),
                        "room deleted externally, nothing to finalize into"
                    );
                    self.sync_queue.clear();
                    let _ = self.cache.remove(&self.room_id).await;
                    return;
                },
                Err(e) => {
                    let delay = backoff.next_delay();
                    if Instant::now() + delay >= deadline {
                        error!(
                            room = %self.room_id,
                            error = %e,
                            unsynced = self.sync_queue.len(),
                            "finalization deadline exceeded; events remain in the warm cache"
                        );
                        return;
                    }
                    warn!(
                        room = %self.room_id,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "finalization write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// The room emptied: finalize, then reap unless someone rejoined
    /// while we were draining.
    ///
    /// Returns `true` when the controller should stop.
    async fn drain_then_reap(&mut self) -> bool {
        debug!(room = %self.room_id, "room empty, draining");
        self.finalize().await;

        // Joins that queued up during the drain cancel the reap.
        while let Ok(cmd) = self.rx.try_recv() {
            if let Command::Finalize { reply } = cmd {
                // Already drained above.
                let _ = reply.send(());
                return true;
            }
            let _ = self.handle(cmd).await;
            if !self.participants.is_empty() {
                info!(room = %self.room_id, "join during drain cancelled reap");
                return false;
            }
        }
        true
    }

    // -- outbound ---------------------------------------------------------

    fn notify_conflict(&mut self, user_id: &UserId, notice: ConflictNotice) {
        let failed = match self.participants.get(user_id) {
            Some(seat) => seat
                .transport
                .send(ServerMessage::OperationConflict { notice })
                .is_err(),
            None => false,
        };
        if failed {
            self.drop_participants(vec![*user_id]);
        }
    }

    /// Send to every participant except `exclude`. Transports that fail
    /// are dropped on the spot — the client reconciles on reconnect.
    fn fan_out(&mut self, exclude: Option<&UserId>, message: &ServerMessage) {
        let mut dropped = Vec::new();
        for (user_id, seat) in &self.participants {
            if Some(user_id) == exclude {
                continue;
            }
            if seat.transport.send(message.clone()).is_err() {
                dropped.push(*user_id);
            }
        }
        self.drop_participants(dropped);
    }

    /// Remove dead seats and announce their departure (which may in
    /// turn surface more dead seats).
    fn drop_participants(&mut self, mut dropped: Vec<UserId>) {
        while let Some(user_id) = dropped.pop() {
            if self.participants.remove(&user_id).is_none() {
                continue;
            }
            warn!(room = %self.room_id, %user_id, "transport failed, participant dropped");
            let message = ServerMessage::ParticipantLeft { user_id };
            for (peer_id, seat) in &self.participants {
                if seat.transport.send(message.clone()).is_err() {
                    dropped.push(*peer_id);
                }
            }
        }
    }

    fn remove_registry_entry(&self) {
        if let Some(rooms) = self.rooms.upgrade() {
            rooms.remove_if(&self.room_id, |_, handle| handle.instance() == self.instance);
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
