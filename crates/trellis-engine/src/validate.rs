//! Batch conflict validation.
//!
//! Timestamp-ordered single-writer validation: the batch is processed
//! in order, each event checked against the state produced by every
//! previously accepted event. Bulk replacements are always accepted;
//! cursor moves are always accepted and never change the document;
//! granular events are accepted only when their targets line up with
//! the working state.
//!
//! Pure: callers pass a snapshot and a sorted batch, and get back the
//! accepted events, the rejections, and the document the accepted
//! events produce.

use trellis_core::{ChangeEvent, FlowData};
use trellis_protocol::ConflictReason;

use crate::apply::apply_event;

/// A rejected event with its classified reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// The event that was rejected.
    pub event: ChangeEvent,
    /// Why it was rejected.
    pub reason: ConflictReason,
}

/// The outcome of validating a batch against a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    /// Events accepted, in input order.
    pub accepted: Vec<ChangeEvent>,
    /// Events rejected, in input order.
    pub rejected: Vec<Rejection>,
    /// The snapshot after applying every accepted event.
    pub state: FlowData,
}

/// Validate a timestamp-sorted batch against a snapshot.
#[must_use]
pub fn validate_batch(snapshot: &FlowData, events: Vec<ChangeEvent>) -> ValidatedBatch {
    let mut state = snapshot.clone();
    let mut accepted = Vec::with_capacity(events.len());
    let mut rejected = Vec::new();

    for event in events {
        match apply_event(&mut state, &event) {
            Ok(()) => accepted.push(event),
            Err(reason) => rejected.push(Rejection { event, reason }),
        }
    }

    ValidatedBatch {
        accepted,
        rejected,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{
        ChangePayload, CursorPosition, Edge, EdgeChange, Node, NodeChange, NodeId, Position,
        RoomId, Timestamp, UserId,
    };

    fn event(timestamp: Timestamp, payload: ChangePayload) -> ChangeEvent {
        ChangeEvent {
            room_id: RoomId::new(),
            user_id: UserId::new(),
            timestamp,
            payload,
        }
    }

    fn add_node(timestamp: Timestamp, id: &str) -> ChangeEvent {
        event(
            timestamp,
            ChangePayload::GranularNodes(vec![NodeChange::Add {
                item: Node::minimal(id, Position::default()),
            }]),
        )
    }

    #[test]
    fn later_event_sees_earlier_accepted_state() {
        let batch = validate_batch(
            &FlowData::empty(),
            vec![
                add_node(10, "n1"),
                event(
                    15,
                    ChangePayload::GranularEdges(vec![EdgeChange::Add {
                        item: Edge::minimal("e1", "n1", "n1"),
                    }]),
                ),
            ],
        );
        assert_eq!(batch.accepted.len(), 2);
        assert!(batch.rejected.is_empty());
        assert_eq!(batch.state.edges.len(), 1);
    }

    #[test]
    fn racing_adds_accept_the_earlier_and_reject_the_later() {
        let batch = validate_batch(
            &FlowData::empty(),
            vec![add_node(10, "n1"), add_node(15, "n1")],
        );
        assert_eq!(batch.accepted.len(), 1);
        assert_eq!(batch.accepted[0].timestamp, 10);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].reason, ConflictReason::AlreadyExists);
        assert_eq!(batch.rejected[0].event.timestamp, 15);
    }

    #[test]
    fn remove_then_modify_rejects_the_modify_with_does_not_exist() {
        let mut snapshot = FlowData::empty();
        snapshot.nodes.push(Node::minimal("n1", Position::default()));

        let batch = validate_batch(
            &snapshot,
            vec![
                event(
                    40,
                    ChangePayload::GranularNodes(vec![NodeChange::Remove {
                        id: NodeId::from("n1"),
                    }]),
                ),
                event(
                    41,
                    ChangePayload::GranularNodes(vec![NodeChange::Position {
                        id: NodeId::from("n1"),
                        position: Position::new(9.0, 9.0),
                        position_absolute: None,
                    }]),
                ),
            ],
        );
        assert_eq!(batch.accepted.len(), 1);
        assert_eq!(batch.rejected[0].reason, ConflictReason::DoesNotExist);
        assert!(batch.state.nodes.is_empty());
    }

    #[test]
    fn double_remove_rejects_the_second() {
        let mut snapshot = FlowData::empty();
        snapshot.nodes.push(Node::minimal("n1", Position::default()));

        let remove = |ts| {
            event(
                ts,
                ChangePayload::GranularNodes(vec![NodeChange::Remove {
                    id: NodeId::from("n1"),
                }]),
            )
        };
        let batch = validate_batch(&snapshot, vec![remove(1), remove(2)]);
        assert_eq!(batch.accepted.len(), 1);
        assert_eq!(batch.rejected[0].reason, ConflictReason::DoesNotExist);
    }

    #[test]
    fn bulk_and_cursor_are_always_accepted() {
        let batch = validate_batch(
            &FlowData::empty(),
            vec![
                event(1, ChangePayload::BulkNodes(vec![])),
                event(2, ChangePayload::BulkEdges(vec![])),
                event(3, ChangePayload::CursorMove(CursorPosition::default())),
            ],
        );
        assert_eq!(batch.accepted.len(), 3);
        assert!(batch.rejected.is_empty());
    }

    #[test]
    fn dangling_edge_is_rejected_and_state_untouched() {
        let mut snapshot = FlowData::empty();
        snapshot.nodes.push(Node::minimal("n1", Position::default()));

        let batch = validate_batch(
            &snapshot,
            vec![event(
                20,
                ChangePayload::GranularEdges(vec![EdgeChange::Add {
                    item: Edge::minimal("e1", "n1", "n9"),
                }]),
            )],
        );
        assert!(batch.accepted.is_empty());
        assert_eq!(batch.rejected[0].reason, ConflictReason::DanglingEndpoint);
        assert!(batch.state.edges.is_empty());
    }
}
