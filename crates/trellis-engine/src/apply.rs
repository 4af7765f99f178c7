//! Change application with inline validation.
//!
//! Every mutation is checked against the document it is about to
//! modify, then applied; a multi-change event is applied to a scratch
//! copy and committed whole, so a rejected event never leaves a partial
//! edit behind. The two edge invariants — unique ids and live
//! endpoints — hold after every successful application because the
//! checks run against the already-updated state.

use std::collections::HashSet;

use tracing::debug;

use trellis_core::{ChangeEvent, ChangePayload, EdgeChange, FlowData, NodeChange, NodeId};
use trellis_protocol::ConflictReason;

/// Validate and apply one event to the document.
///
/// Bulk payloads replace the whole collection and always succeed.
/// Granular payloads apply their sub-changes in order against a
/// scratch copy; the first invalid sub-change rejects the whole event
/// and leaves the document untouched. Cursor moves are a no-op here.
///
/// # Errors
///
/// Returns the [`ConflictReason`] of the first invalid sub-change.
pub fn apply_event(doc: &mut FlowData, event: &ChangeEvent) -> Result<(), ConflictReason> {
    match &event.payload {
        ChangePayload::BulkNodes(nodes) => {
            doc.nodes = nodes.clone();
            prune_dangling_edges(doc);
            Ok(())
        },
        ChangePayload::BulkEdges(edges) => {
            doc.edges = edges.clone();
            Ok(())
        },
        ChangePayload::GranularNodes(changes) => {
            let mut scratch = doc.clone();
            for change in changes {
                apply_node_change(&mut scratch, change)?;
            }
            *doc = scratch;
            Ok(())
        },
        ChangePayload::GranularEdges(changes) => {
            let mut scratch = doc.clone();
            for change in changes {
                apply_edge_change(&mut scratch, change)?;
            }
            *doc = scratch;
            Ok(())
        },
        ChangePayload::CursorMove(_) => Ok(()),
    }
}

fn apply_node_change(doc: &mut FlowData, change: &NodeChange) -> Result<(), ConflictReason> {
    match change {
        NodeChange::Add { item } => {
            if doc.has_node(&item.id) {
                return Err(ConflictReason::AlreadyExists);
            }
            doc.nodes.push(item.clone());
            Ok(())
        },
        NodeChange::Remove { id } => {
            if !doc.has_node(id) {
                return Err(ConflictReason::DoesNotExist);
            }
            doc.nodes.retain(|n| &n.id != id);
            // Edges referencing the node die with it.
            doc.edges.retain(|e| &e.source != id && &e.target != id);
            Ok(())
        },
        NodeChange::Replace { id, item } => {
            let Some(node) = doc.node_mut(id) else {
                return Err(ConflictReason::DoesNotExist);
            };
            *node = item.clone();
            Ok(())
        },
        NodeChange::Position {
            id,
            position,
            position_absolute,
        } => {
            let Some(node) = doc.node_mut(id) else {
                return Err(ConflictReason::DoesNotExist);
            };
            node.position = *position;
            if position_absolute.is_some() {
                node.position_absolute = *position_absolute;
            }
            Ok(())
        },
        NodeChange::Dimensions { id, dimensions } => {
            let Some(node) = doc.node_mut(id) else {
                return Err(ConflictReason::DoesNotExist);
            };
            node.dimensions = Some(*dimensions);
            Ok(())
        },
        NodeChange::Select { id, selected } => {
            let Some(node) = doc.node_mut(id) else {
                return Err(ConflictReason::DoesNotExist);
            };
            node.selected = *selected;
            Ok(())
        },
    }
}

fn apply_edge_change(doc: &mut FlowData, change: &EdgeChange) -> Result<(), ConflictReason> {
    match change {
        EdgeChange::Add { item } => {
            if doc.has_edge(&item.id) {
                return Err(ConflictReason::AlreadyExists);
            }
            if !doc.has_node(&item.source) || !doc.has_node(&item.target) {
                return Err(ConflictReason::DanglingEndpoint);
            }
            doc.edges.push(item.clone());
            Ok(())
        },
        EdgeChange::Remove { id } => {
            if !doc.has_edge(id) {
                return Err(ConflictReason::DoesNotExist);
            }
            doc.edges.retain(|e| &e.id != id);
            Ok(())
        },
        EdgeChange::Replace { id, item } => {
            if !doc.has_edge(id) {
                return Err(ConflictReason::DoesNotExist);
            }
            if !doc.has_node(&item.source) || !doc.has_node(&item.target) {
                return Err(ConflictReason::DanglingEndpoint);
            }
            let Some(edge) = doc.edge_mut(id) else {
                return Err(ConflictReason::DoesNotExist);
            };
            *edge = item.clone();
            Ok(())
        },
        EdgeChange::Select { id, selected } => {
            let Some(edge) = doc.edge_mut(id) else {
                return Err(ConflictReason::DoesNotExist);
            };
            edge.selected = *selected;
            Ok(())
        },
    }
}

/// Drop edges whose endpoints vanished in a bulk node replacement.
fn prune_dangling_edges(doc: &mut FlowData) {
    let before = doc.edges.len();
    let ids: HashSet<&NodeId> = doc.nodes.iter().map(|n| &n.id).collect();
    let edges = std::mem::take(&mut doc.edges);
    doc.edges = edges
        .into_iter()
        .filter(|e| ids.contains(&e.source) && ids.contains(&e.target))
        .collect();
    let dropped = before - doc.edges.len();
    if dropped > 0 {
        debug!(dropped, "pruned edges orphaned by bulk node replacement");
    }
}
