use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect, Size};

/// Opaque identifier shared by nodes, edges, and containers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Flow direction along the major axis. Serialized with the compass tokens
/// diagram tools exchange ("LR", "TB", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "TB", alias = "TD")]
    TopDown,
    #[serde(rename = "BT")]
    BottomTop,
    #[default]
    #[serde(rename = "LR")]
    LeftRight,
    #[serde(rename = "RL")]
    RightLeft,
}

impl Direction {
    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::LeftRight | Direction::RightLeft)
    }

    /// Directions that run against coordinate growth on their major axis.
    pub fn is_reversed(self) -> bool {
        matches!(self, Direction::BottomTop | Direction::RightLeft)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Task,
    Event,
    Gateway,
    Subprocess,
    /// Event attached to the border of a host node. Its `parent` is the host.
    Boundary,
    Annotation,
    Pool,
    Lane,
}

impl NodeKind {
    /// Kinds that take part in flow layout. Pools and lanes frame the flow
    /// instead of participating in it.
    pub fn participates_in_flow(self) -> bool {
        !matches!(self, NodeKind::Pool | NodeKind::Lane)
    }

    /// Kinds whose box is autosized around their children.
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Pool | NodeKind::Subprocess)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelOrientation {
    Top,
    Bottom,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub text: String,
    pub rect: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<LabelOrientation>,
}

impl Label {
    pub fn new(text: impl Into<String>, rect: Rect) -> Self {
        Self {
            text: text.into(),
            rect,
            orientation: None,
        }
    }
}

/// Lane ordering and minimum-size constraints carried by container nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    #[serde(default)]
    pub lanes: Vec<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<Size>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramNode {
    pub id: ElementId,
    pub kind: NodeKind,
    pub rect: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerInfo>,
    /// Holds the node out of automatic repositioning while keeping its box
    /// as an obstacle. Authored on the element itself, unlike session pins.
    #[serde(default)]
    pub fixed: bool,
}

impl DiagramNode {
    pub fn new(id: impl Into<ElementId>, kind: NodeKind, rect: Rect) -> Self {
        Self {
            id: id.into(),
            kind,
            rect,
            parent: None,
            label: None,
            container: None,
            fixed: false,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<ElementId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_container(mut self, info: ContainerInfo) -> Self {
        self.container = Some(info);
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramEdge {
    pub id: ElementId,
    pub source: ElementId,
    pub target: ElementId,
    #[serde(default)]
    pub waypoints: Vec<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
    /// Marks the default branch out of a gateway. The happy-path walk
    /// prefers these over declaration order.
    #[serde(default)]
    pub primary: bool,
}

impl DiagramEdge {
    pub fn new(
        id: impl Into<ElementId>,
        source: impl Into<ElementId>,
        target: impl Into<ElementId>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            waypoints: Vec::new(),
            label: None,
            primary: false,
        }
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_waypoints(mut self, waypoints: Vec<Point>) -> Self {
        self.waypoints = waypoints;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn touches(&self, id: &ElementId) -> bool {
        &self.source == id || &self.target == id
    }
}

/// Flat element store. Nodes and edges keep declaration order; parent links
/// express containment and are resolved through the id index on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagram {
    nodes: Vec<DiagramNode>,
    edges: Vec<DiagramEdge>,
    #[serde(skip)]
    node_index: HashMap<ElementId, usize>,
    #[serde(skip)]
    edge_index: HashMap<ElementId, usize>,
}

impl Diagram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(nodes: Vec<DiagramNode>, edges: Vec<DiagramEdge>) -> Self {
        let mut diagram = Self::new();
        for node in nodes {
            diagram.insert_node(node);
        }
        for edge in edges {
            diagram.insert_edge(edge);
        }
        diagram
    }

    /// Rebuilds the id indices. Required after deserializing, which skips
    /// the index fields.
    pub fn reindex(&mut self) {
        self.node_index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        self.edge_index = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
    }

    pub fn insert_node(&mut self, node: DiagramNode) {
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    pub fn insert_edge(&mut self, edge: DiagramEdge) {
        self.edge_index.insert(edge.id.clone(), self.edges.len());
        self.edges.push(edge);
    }

    pub fn node(&self, id: &ElementId) -> Option<&DiagramNode> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, id: &ElementId) -> Option<&mut DiagramNode> {
        self.node_index.get(id).map(|&i| &mut self.nodes[i])
    }

    pub fn edge(&self, id: &ElementId) -> Option<&DiagramEdge> {
        self.edge_index.get(id).map(|&i| &self.edges[i])
    }

    pub fn edge_mut(&mut self, id: &ElementId) -> Option<&mut DiagramEdge> {
        self.edge_index.get(id).map(|&i| &mut self.edges[i])
    }

    pub fn has_element(&self, id: &ElementId) -> bool {
        self.node_index.contains_key(id) || self.edge_index.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DiagramNode> {
        self.nodes.iter()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut DiagramNode> {
        self.nodes.iter_mut()
    }

    pub fn edges(&self) -> impl Iterator<Item = &DiagramEdge> {
        self.edges.iter()
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = &mut DiagramEdge> {
        self.edges.iter_mut()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn children_of<'a>(&'a self, id: &'a ElementId) -> impl Iterator<Item = &'a DiagramNode> {
        self.nodes
            .iter()
            .filter(move |n| n.parent.as_ref() == Some(id))
    }

    pub fn incident_edges<'a>(
        &'a self,
        id: &'a ElementId,
    ) -> impl Iterator<Item = &'a DiagramEdge> {
        self.edges.iter().filter(move |e| e.touches(id))
    }

    /// True when `id` sits inside `ancestor` at any containment depth.
    /// The walk is bounded by node count to survive malformed parent cycles.
    pub fn is_within(&self, id: &ElementId, ancestor: &ElementId) -> bool {
        let mut current = self.node(id).and_then(|n| n.parent.as_ref());
        let mut hops = 0usize;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.nodes.len() {
                return false;
            }
            current = self.node(parent).and_then(|n| n.parent.as_ref());
        }
        false
    }

    pub fn into_parts(self) -> (Vec<DiagramNode>, Vec<DiagramEdge>) {
        (self.nodes, self.edges)
    }
}
