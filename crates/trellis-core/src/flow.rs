//! The flow document: ordered nodes and edges plus per-user viewports.
//!
//! Nodes and edges live in ordered `Vec`s because clients render them in
//! insertion order. Lookups during validation go through the id-index
//! helpers instead of a pointer graph; edge endpoints are id references
//! that are checked on mutation, never dereferenced pointers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::{EdgeId, NodeId, UserId};

/// A 2-D position on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Construct a position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rendered size of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in canvas units.
    pub width: f64,
    /// Height in canvas units.
    pub height: f64,
}

/// User-editable content of a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeContent {
    /// Display label.
    pub label: String,
    /// Optional longer description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional fill color (CSS color string).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    /// Optional text color (CSS color string).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    /// Editor-specific extra fields, forwarded untouched.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A node of the flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique id within the room.
    pub id: NodeId,
    /// Node type tag understood by the client renderer.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    /// Canvas position.
    pub position: Position,
    /// Absolute position when the node is nested inside a group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_absolute: Option<Position>,
    /// Rendered size, set by the client after layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    /// Whether the node is selected in the author's editor.
    #[serde(default)]
    pub selected: bool,
    /// User content.
    #[serde(default)]
    pub data: NodeContent,
}

impl Node {
    /// A minimal node with just an id and position, for tests and seeds.
    #[must_use]
    pub fn minimal(id: impl Into<NodeId>, position: Position) -> Self {
        Self {
            id: id.into(),
            node_type: None,
            position,
            position_absolute: None,
            dimensions: None,
            selected: false,
            data: NodeContent::default(),
        }
    }
}

/// An edge connecting two nodes by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique id within the room.
    pub id: EdgeId,
    /// Source node id.
    pub source: NodeId,
    /// Target node id.
    pub target: NodeId,
    /// Handle on the source node, when the node exposes several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Handle on the target node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    /// Edge type tag understood by the client renderer.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    /// Optional label rendered on the edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Whether the client animates the edge.
    #[serde(default)]
    pub animated: bool,
    /// Whether the edge is selected in the author's editor.
    #[serde(default)]
    pub selected: bool,
    /// Editor-specific extra data, forwarded untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Edge {
    /// A minimal edge for tests and seeds.
    #[must_use]
    pub fn minimal(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            edge_type: None,
            label: None,
            animated: false,
            selected: false,
            data: None,
        }
    }
}

/// A participant's saved viewport. Stored with the document, never
/// synchronized between clients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    /// Pan offset, x.
    pub x: f64,
    /// Pan offset, y.
    pub y: f64,
    /// Zoom factor.
    pub zoom: f64,
}

/// A participant's live cursor position on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CursorPosition {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// The shared flow document: ordered nodes and ordered edges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowData {
    /// Nodes in client insertion order.
    pub nodes: Vec<Node>,
    /// Edges in client insertion order.
    pub edges: Vec<Edge>,
    /// Per-user viewport state. Persisted but never fanned out.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub viewports: HashMap<UserId, Viewport>,
}

impl FlowData {
    /// An empty document.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the document has a node with the given id.
    #[must_use]
    pub fn has_node(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }

    /// Whether the document has an edge with the given id.
    #[must_use]
    pub fn has_edge(&self, id: &EdgeId) -> bool {
        self.edges.iter().any(|e| &e.id == id)
    }

    /// Mutable access to the node with the given id.
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    /// Mutable access to the edge with the given id.
    pub fn edge_mut(&mut self, id: &EdgeId) -> Option<&mut Edge> {
        self.edges.iter_mut().find(|e| &e.id == id)
    }

    /// Id → position index over the nodes.
    #[must_use]
    pub fn node_index(&self) -> HashMap<&NodeId, usize> {
        self.nodes.iter().enumerate().map(|(i, n)| (&n.id, i)).collect()
    }

    /// Id → position index over the edges.
    #[must_use]
    pub fn edge_index(&self) -> HashMap<&EdgeId, usize> {
        self.edges.iter().enumerate().map(|(i, e)| (&e.id, i)).collect()
    }

    /// Materialize a document from a stored JSON blob.
    ///
    /// A `null`/missing blob and missing `nodes`/`edges` fields all
    /// default to empty sequences, so freshly created rooms and legacy
    /// rows load cleanly.
    #[must_use]
    pub fn from_stored(blob: Option<serde_json::Value>) -> Self {
        match blob {
            None | Some(serde_json::Value::Null) => Self::empty(),
            Some(value) => serde_json::from_value(value).unwrap_or_else(|_| Self::empty()),
        }
    }

    /// Serialize for storage.
    ///
    /// Infallible for this type; the JSON tree is built directly from
    /// the in-memory document.
    #[must_use]
    pub fn to_stored(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
