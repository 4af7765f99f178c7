//! End-to-end pipeline scenarios against the in-memory stack:
//! concurrent edits, conflict rejection, bulk supersession, durability
//! across shutdown, and the cursor fast lane.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use trellis_core::{
    ChangePayload, CursorPosition, Edge, EdgeChange, FlowData, Node, NodeChange, NodeId, Position,
};
use trellis_protocol::{ConflictReason, ServerMessage};

use common::{RecordingTransport, fixture, fixture_with, fast_engine_config, wait_until};

fn add_node(id: &str, x: f64, y: f64) -> ChangePayload {
    ChangePayload::GranularNodes(vec![NodeChange::Add {
        item: Node::minimal(id, Position::new(x, y)),
    }])
}

fn seeded_nodes(ids: &[&str]) -> FlowData {
    let mut flow = FlowData::empty();
    for id in ids {
        flow.nodes.push(Node::minimal(*id, Position::default()));
    }
    flow
}

#[tokio::test]
async fn two_clients_adding_distinct_nodes_both_land() {
    let fx = fixture();
    let (alice, bob) = (fx.editor("alice"), fx.editor("bob"));
    let (ta, tb) = (RecordingTransport::new(), RecordingTransport::new());

    let ha = fx
        .registry
        .join(fx.room_id, alice.clone(), ta.clone())
        .await
        .unwrap();
    let hb = fx
        .registry
        .join(fx.room_id, bob.clone(), tb.clone())
        .await
        .unwrap();

    ha.ingest(alice.user_id, add_node("n1", 0.0, 0.0));
    hb.ingest(bob.user_id, add_node("n2", 5.0, 5.0));

    // Both clients see the consolidated broadcast.
    assert!(
        wait_until(Duration::from_secs(1), || {
            !ta.flow_changes().is_empty() && !tb.flow_changes().is_empty()
        })
        .await
    );

    // After the sync window the durable store has both nodes.
    assert!(
        wait_until(Duration::from_secs(2), || {
            let flow = fx.stored_flow();
            flow.has_node(&NodeId::from("n1")) && flow.has_node(&NodeId::from("n2"))
        })
        .await
    );
    assert_eq!(fx.stored_flow().nodes.len(), 2);
}

#[tokio::test]
async fn dangling_edge_is_rejected_to_author_only() {
    let fx = fixture_with(fast_engine_config(), Some(seeded_nodes(&["n1"])));
    let (alice, bob) = (fx.editor("alice"), fx.editor("bob"));
    let (ta, tb) = (RecordingTransport::new(), RecordingTransport::new());

    let ha = fx
        .registry
        .join(fx.room_id, alice.clone(), ta.clone())
        .await
        .unwrap();
    fx.registry
        .join(fx.room_id, bob.clone(), tb.clone())
        .await
        .unwrap();

    ha.ingest(
        alice.user_id,
        ChangePayload::GranularEdges(vec![EdgeChange::Add {
            item: Edge::minimal("e1", "n1", "n9"),
        }]),
    );

    assert!(wait_until(Duration::from_secs(1), || !ta.conflicts().is_empty()).await);
    let ServerMessage::OperationConflict { notice } = ta.conflicts().remove(0) else {
        panic!("expected a conflict");
    };
    assert_eq!(notice.reason, ConflictReason::DanglingEndpoint);

    // Peers see nothing; the broadcast window passes without a frame.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(tb.flow_changes().is_empty());
    assert!(tb.conflicts().is_empty());
    assert!(fx.stored_flow().edges.is_empty());
}

#[tokio::test]
async fn bulk_at_later_timestamp_supersedes_granular() {
    let fx = fixture_with(fast_engine_config(), Some(seeded_nodes(&["n1", "n2"])));
    let (alice, bob) = (fx.editor("alice"), fx.editor("bob"));
    let (ta, tb) = (RecordingTransport::new(), RecordingTransport::new());

    let ha = fx
        .registry
        .join(fx.room_id, alice.clone(), ta.clone())
        .await
        .unwrap();
    let hb = fx
        .registry
        .join(fx.room_id, bob.clone(), tb.clone())
        .await
        .unwrap();

    // Same debounce window: the position edit lands first, the bulk
    // replacement second. The later timestamp dominates.
    ha.ingest(
        alice.user_id,
        ChangePayload::GranularNodes(vec![NodeChange::Position {
            id: NodeId::from("n1"),
            position: Position::new(100.0, 0.0),
            position_absolute: None,
        }]),
    );
    hb.ingest(
        bob.user_id,
        ChangePayload::BulkNodes(vec![Node::minimal("n3", Position::default())]),
    );

    assert!(
        wait_until(Duration::from_secs(2), || {
            let flow = fx.stored_flow();
            flow.nodes.len() == 1 && flow.has_node(&NodeId::from("n3"))
        })
        .await
    );
    // The superseded position edit is invisible everywhere.
    let flow = fx.stored_flow();
    assert!(!flow.has_node(&NodeId::from("n1")));
}

#[tokio::test]
async fn remove_then_modify_rejects_the_modify() {
    let fx = fixture_with(fast_engine_config(), Some(seeded_nodes(&["n1"])));
    let (alice, bob) = (fx.editor("alice"), fx.editor("bob"));
    let (ta, tb) = (RecordingTransport::new(), RecordingTransport::new());

    let ha = fx
        .registry
        .join(fx.room_id, alice.clone(), ta.clone())
        .await
        .unwrap();
    let hb = fx
        .registry
        .join(fx.room_id, bob.clone(), tb.clone())
        .await
        .unwrap();

    ha.ingest(
        alice.user_id,
        ChangePayload::GranularNodes(vec![NodeChange::Remove {
            id: NodeId::from("n1"),
        }]),
    );
    hb.ingest(
        bob.user_id,
        ChangePayload::GranularNodes(vec![NodeChange::Position {
            id: NodeId::from("n1"),
            position: Position::new(9.0, 9.0),
            position_absolute: None,
        }]),
    );

    assert!(wait_until(Duration::from_secs(1), || !tb.conflicts().is_empty()).await);
    let ServerMessage::OperationConflict { notice } = tb.conflicts().remove(0) else {
        panic!("expected a conflict");
    };
    assert_eq!(notice.reason, ConflictReason::DoesNotExist);
    assert!(ta.conflicts().is_empty());

    assert!(wait_until(Duration::from_secs(2), || fx.stored_flow().nodes.is_empty()).await);
}

#[tokio::test]
async fn finalize_persists_before_the_sync_window_elapses() {
    // A long sync debounce: shutdown arrives first.
    let mut config = fast_engine_config();
    config.sync_debounce_ms = 60_000;
    let fx = fixture_with(config, None);
    let alice = fx.editor("alice");
    let ta = RecordingTransport::new();

    let ha = fx
        .registry
        .join(fx.room_id, alice.clone(), ta.clone())
        .await
        .unwrap();
    for i in 0..5 {
        ha.ingest(alice.user_id, add_node(&format!("n{i}"), 0.0, 0.0));
    }

    // Nothing synced yet.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fx.stored_flow().nodes.is_empty());

    fx.registry.finalize_all().await;
    assert_eq!(fx.stored_flow().nodes.len(), 5);

    // A fresh join sees the persisted state.
    let tb = RecordingTransport::new();
    fx.registry
        .join(fx.room_id, alice.clone(), tb.clone())
        .await
        .unwrap();
    let Some(ServerMessage::RoomJoined { flow_data, .. }) = tb.messages().into_iter().next()
    else {
        panic!("expected a join snapshot");
    };
    assert_eq!(flow_data.nodes.len(), 5);
}

#[tokio::test]
async fn cursors_fan_out_but_never_persist() {
    let fx = fixture_with(fast_engine_config(), Some(seeded_nodes(&["n1"])));
    let (alice, bob) = (fx.editor("alice"), fx.editor("bob"));
    let (ta, tb) = (RecordingTransport::new(), RecordingTransport::new());

    let ha = fx
        .registry
        .join(fx.room_id, alice.clone(), ta.clone())
        .await
        .unwrap();
    fx.registry
        .join(fx.room_id, bob.clone(), tb.clone())
        .await
        .unwrap();

    let seeded_at = fx.store.room(&fx.room_id).unwrap().updated_at;

    for i in 0..200 {
        ha.cursor(
            alice.user_id,
            CursorPosition {
                x: f64::from(i),
                y: 0.0,
            },
        );
    }

    // Bob sees cursor traffic immediately, without waiting a window.
    assert!(
        wait_until(Duration::from_secs(1), || {
            tb.messages()
                .iter()
                .any(|m| matches!(m, ServerMessage::CursorMove { .. }))
        })
        .await
    );
    // Alice gets no echo of her own cursor.
    assert!(
        !ta.messages()
            .iter()
            .any(|m| matches!(m, ServerMessage::CursorMove { .. }))
    );

    // No sync happened: the store row is byte-for-byte untouched.
    fx.registry.finalize_all().await;
    let record = fx.store.room(&fx.room_id).unwrap();
    assert_eq!(record.updated_at, seeded_at);
    let flow = FlowData::from_stored(record.flow_data);
    assert_eq!(flow, seeded_nodes(&["n1"]));
}

#[tokio::test]
async fn cursor_sent_as_flow_change_still_takes_the_fast_lane() {
    let fx = fixture();
    let alice = fx.editor("alice");
    let ta = RecordingTransport::new();
    let ha = fx
        .registry
        .join(fx.room_id, alice.clone(), ta.clone())
        .await
        .unwrap();

    let seeded_at = fx.store.room(&fx.room_id).unwrap().updated_at;
    ha.ingest(
        alice.user_id,
        ChangePayload::CursorMove(CursorPosition { x: 1.0, y: 1.0 }),
    );

    fx.registry.finalize_all().await;
    assert_eq!(fx.store.room(&fx.room_id).unwrap().updated_at, seeded_at);
}
