//! Batch consolidation.
//!
//! Reduces a timestamp-sorted batch to a minimal equivalent set: at
//! most one surviving event per kind family (nodes, edges), plus any
//! pass-through cursor moves. Pure — no I/O, no clock; timestamps on
//! the output are drawn from the inputs.
//!
//! Rules, per kind family:
//!
//! - the latest bulk replacement supersedes every earlier event of the
//!   family, bulk or granular;
//! - granular events stamped after the latest bulk concatenate, in
//!   timestamp order, into one synthetic granular event bearing the
//!   max contributing timestamp (and its author);
//! - when both a bulk and an accumulated granular survive, the one
//!   with the greater timestamp wins and the loser is dropped. This
//!   tie-break is observable by clients and must not be "fixed".
//!
//! Output emission order: bulk nodes, granular nodes, bulk edges,
//! granular edges, then cursors.

use trellis_core::{ChangeEvent, ChangePayload, EdgeChange, NodeChange};

/// Sort a batch by timestamp unless it is already sorted.
///
/// Batches arrive nearly always in order (single mailbox, monotonic
/// clock), so the common case is a linear scan and no allocation.
pub fn sort_by_timestamp(events: &mut [ChangeEvent]) {
    if !events.is_sorted_by_key(|e| e.timestamp) {
        events.sort_by_key(|e| e.timestamp);
    }
}

/// Event metadata without its payload.
#[derive(Clone, Copy)]
struct Meta {
    room_id: trellis_core::RoomId,
    user_id: trellis_core::UserId,
    timestamp: trellis_core::Timestamp,
}

impl From<&ChangeEvent> for Meta {
    fn from(event: &ChangeEvent) -> Self {
        Self {
            room_id: event.room_id,
            user_id: event.user_id,
            timestamp: event.timestamp,
        }
    }
}

/// Accumulator for one kind family (nodes or edges).
struct FamilySlot<B, G> {
    /// Latest bulk payload and its event metadata.
    bulk: Option<(Meta, B)>,
    /// Granular changes stamped after the latest bulk, concatenated.
    granular: Vec<G>,
    /// Metadata of the last granular contributor.
    granular_meta: Option<Meta>,
}

impl<B, G> FamilySlot<B, G> {
    fn new() -> Self {
        Self {
            bulk: None,
            granular: Vec::new(),
            granular_meta: None,
        }
    }

    fn push_bulk(&mut self, meta: Meta, payload: B) {
        // A later bulk supersedes everything earlier in the family.
        self.bulk = Some((meta, payload));
        self.granular.clear();
        self.granular_meta = None;
    }

    fn push_granular(&mut self, meta: Meta, changes: Vec<G>) {
        self.granular.extend(changes);
        self.granular_meta = Some(meta);
    }
}

/// Consolidate a timestamp-sorted batch.
///
/// With `skip_non_persistent`, cursor moves are dropped instead of
/// passed through — the setting used by both the broadcast and the
/// sync pipeline, since cursors ride their own fast lane.
#[must_use]
pub fn consolidate(events: Vec<ChangeEvent>, skip_non_persistent: bool) -> Vec<ChangeEvent> {
    let mut nodes: FamilySlot<Vec<trellis_core::Node>, NodeChange> = FamilySlot::new();
    let mut edges: FamilySlot<Vec<trellis_core::Edge>, EdgeChange> = FamilySlot::new();
    let mut cursors = Vec::new();

    for event in events {
        let meta = Meta::from(&event);
        match event.payload {
            ChangePayload::BulkNodes(items) => nodes.push_bulk(meta, items),
            ChangePayload::GranularNodes(changes) => nodes.push_granular(meta, changes),
            ChangePayload::BulkEdges(items) => edges.push_bulk(meta, items),
            ChangePayload::GranularEdges(changes) => edges.push_granular(meta, changes),
            ChangePayload::CursorMove(_) => {
                if !skip_non_persistent {
                    cursors.push(event);
                }
            },
        }
    }

    let mut out = Vec::with_capacity(4 + cursors.len());
    append_family(&mut out, nodes, ChangePayload::BulkNodes, ChangePayload::GranularNodes);
    append_family(&mut out, edges, ChangePayload::BulkEdges, ChangePayload::GranularEdges);
    out.extend(cursors);
    out
}

fn append_family<B, G>(
    out: &mut Vec<ChangeEvent>,
    slot: FamilySlot<B, G>,
    make_bulk: impl Fn(B) -> ChangePayload,
    make_granular: impl Fn(Vec<G>) -> ChangePayload,
) {
    let bulk = slot.bulk;
    let granular = slot
        .granular_meta
        .filter(|_| !slot.granular.is_empty())
        .map(|meta| (meta, slot.granular));

    match (bulk, granular) {
        (Some((bulk_meta, items)), Some((gran_meta, changes))) => {
            // Latest timestamp wins; the loser is dropped outright.
            if bulk_meta.timestamp >= gran_meta.timestamp {
                out.push(with_payload(bulk_meta, make_bulk(items)));
            } else {
                out.push(with_payload(gran_meta, make_granular(changes)));
            }
        },
        (Some((bulk_meta, items)), None) => {
            out.push(with_payload(bulk_meta, make_bulk(items)));
        },
        (None, Some((gran_meta, changes))) => {
            out.push(with_payload(gran_meta, make_granular(changes)));
        },
        (None, None) => {},
    }
}

fn with_payload(meta: Meta, payload: ChangePayload) -> ChangeEvent {
    ChangeEvent {
        room_id: meta.room_id,
        user_id: meta.user_id,
        timestamp: meta.timestamp,
        payload,
    }
}
