//! Room lifecycle behaviours: access gating, role enforcement, sync
//! retry under store failure, transport drops, and reap/rejoin.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use trellis_core::{
    ChangeEvent, ChangePayload, FlowData, Node, NodeChange, NodeId, Position, Principal, RoomId,
    UserId,
};
use trellis_engine::EngineError;
use trellis_protocol::ServerMessage;
use trellis_store::{CachedRoom, WarmCache};

use common::{RecordingTransport, fixture, fixture_with, fast_engine_config, wait_until};

fn add_node(id: &str) -> ChangePayload {
    ChangePayload::GranularNodes(vec![NodeChange::Add {
        item: Node::minimal(id, Position::default()),
    }])
}

#[tokio::test]
async fn stranger_is_denied_a_private_room() {
    let fx = fixture();
    let stranger = Principal {
        user_id: UserId::new(),
        name: "stranger".into(),
    };
    let t = RecordingTransport::new();
    let err = fx
        .registry
        .join(fx.room_id, stranger, t)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied));
}

#[tokio::test]
async fn unknown_room_reports_not_found() {
    let fx = fixture();
    let alice = fx.editor("alice");
    let t = RecordingTransport::new();
    let err = fx
        .registry
        .join(RoomId::new(), alice, t)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RoomNotFound));
}

#[tokio::test]
async fn viewer_changes_are_refused_without_touching_the_document() {
    let fx = fixture();
    let viewer = fx.viewer("watcher");
    let t = RecordingTransport::new();
    let handle = fx
        .registry
        .join(fx.room_id, viewer.clone(), t.clone())
        .await
        .unwrap();

    handle.ingest(viewer.user_id, add_node("n1"));

    assert!(
        wait_until(Duration::from_secs(1), || {
            t.messages()
                .iter()
                .any(|m| matches!(m, ServerMessage::Error { .. }))
        })
        .await
    );
    fx.registry.finalize_all().await;
    assert!(fx.stored_flow().nodes.is_empty());
}

#[tokio::test]
async fn sync_retries_with_backoff_until_the_store_recovers() {
    let fx = fixture();
    let alice = fx.editor("alice");
    let t = RecordingTransport::new();
    let handle = fx
        .registry
        .join(fx.room_id, alice.clone(), t.clone())
        .await
        .unwrap();

    fx.store.set_fail_writes(true);
    handle.ingest(alice.user_id, add_node("n1"));

    // The first sync attempt fails; events stay queued and pending.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(fx.stored_flow().nodes.is_empty());
    assert!(fx.cache.has_pending(&fx.room_id).await.unwrap());

    // Store heals: the retry lands without any new ingest.
    fx.store.set_fail_writes(false);
    assert!(
        wait_until(Duration::from_secs(2), || {
            fx.stored_flow().has_node(&NodeId::from("n1"))
        })
        .await
    );
    assert!(!fx.cache.has_pending(&fx.room_id).await.unwrap());
}

#[tokio::test]
async fn finalize_retries_under_its_deadline() {
    let mut config = fast_engine_config();
    config.sync_debounce_ms = 60_000;
    let fx = fixture_with(config, None);
    let alice = fx.editor("alice");
    let t = RecordingTransport::new();
    let handle = fx
        .registry
        .join(fx.room_id, alice.clone(), t.clone())
        .await
        .unwrap();

    fx.store.set_fail_writes(true);
    handle.ingest(alice.user_id, add_node("n1"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Heal the store shortly after finalization starts; the retry
    // loop inside finalize must pick it up.
    let store = fx.store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        store.set_fail_writes(false);
    });

    fx.registry.finalize_all().await;
    assert!(fx.stored_flow().has_node(&NodeId::from("n1")));
}

#[tokio::test]
async fn dead_transport_is_dropped_and_announced() {
    let fx = fixture();
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

    // Bob's socket dies silently; the next fan-out discovers it.
    tb.close();
    ha.ingest(alice.user_id, add_node("n1"));

    assert!(
        wait_until(Duration::from_secs(1), || {
            ta.messages().iter().any(|m| {
                matches!(m, ServerMessage::ParticipantLeft { user_id } if *user_id == bob.user_id)
            })
        })
        .await
    );
}

#[tokio::test]
async fn room_reaps_when_empty_and_rejoin_reloads_persisted_state() {
    let fx = fixture();
    let alice = fx.editor("alice");
    let ta = RecordingTransport::new();
    let handle = fx
        .registry
        .join(fx.room_id, alice.clone(), ta.clone())
        .await
        .unwrap();

    handle.ingest(alice.user_id, add_node("n1"));
    handle.leave(alice.user_id);

    // Leaving empties the room: finalization persists, then reap.
    assert!(
        wait_until(Duration::from_secs(2), || {
            fx.stored_flow().has_node(&NodeId::from("n1")) && fx.registry.active_rooms() == 0
        })
        .await
    );
    assert!(handle.is_closed());

    // Rejoin spawns a fresh controller with the persisted document.
    let tb = RecordingTransport::new();
    fx.registry
        .join(fx.room_id, alice.clone(), tb.clone())
        .await
        .unwrap();
    let Some(ServerMessage::RoomJoined { flow_data, .. }) = tb.messages().into_iter().next()
    else {
        panic!("expected a join snapshot");
    };
    assert!(flow_data.has_node(&NodeId::from("n1")));
}

#[tokio::test]
async fn join_snapshot_includes_unsynced_changes() {
    let mut config = fast_engine_config();
    config.sync_debounce_ms = 60_000;
    let fx = fixture_with(config, None);
    let (alice, bob) = (fx.editor("alice"), fx.editor("bob"));
    let (ta, tb) = (RecordingTransport::new(), RecordingTransport::new());

    let ha = fx
        .registry
        .join(fx.room_id, alice.clone(), ta.clone())
        .await
        .unwrap();
    ha.ingest(alice.user_id, add_node("n1"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Nothing persisted yet, but Bob's snapshot still has the node.
    assert!(fx.stored_flow().nodes.is_empty());
    fx.registry
        .join(fx.room_id, bob.clone(), tb.clone())
        .await
        .unwrap();
    let Some(ServerMessage::RoomJoined { flow_data, .. }) = tb.messages().into_iter().next()
    else {
        panic!("expected a join snapshot");
    };
    assert!(flow_data.has_node(&NodeId::from("n1")));
}

#[tokio::test]
async fn orphaned_pending_changes_are_recovered_on_load() {
    let fx = fixture();
    let alice = fx.editor("alice");

    // A previous engine instance crashed after buffering a change in
    // the warm cache but before syncing it.
    let cached = CachedRoom {
        flow_data: FlowData::empty(),
        last_synced_at: chrono::Utc::now(),
    };
    fx.cache.put(&fx.room_id, cached).await.unwrap();
    fx.cache
        .append_pending(
            &fx.room_id,
            ChangeEvent {
                room_id: fx.room_id,
                user_id: alice.user_id,
                timestamp: 1,
                payload: add_node("ghost"),
            },
        )
        .await
        .unwrap();

    let t = RecordingTransport::new();
    fx.registry
        .join(fx.room_id, alice.clone(), t.clone())
        .await
        .unwrap();

    // The snapshot includes the recovered change, and it gets synced.
    let Some(ServerMessage::RoomJoined { flow_data, .. }) = t.messages().into_iter().next()
    else {
        panic!("expected a join snapshot");
    };
    assert!(flow_data.has_node(&NodeId::from("ghost")));
    assert!(
        wait_until(Duration::from_secs(2), || {
            fx.stored_flow().has_node(&NodeId::from("ghost"))
        })
        .await
    );
}
