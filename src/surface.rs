use thiserror::Error;

use crate::geometry::{Point, Rect};
use crate::model::{Diagram, DiagramEdge, DiagramNode, ElementId, LabelOrientation};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SurfaceError {
    #[error("element `{0}` not found on surface")]
    NotFound(ElementId),
    #[error("element `{0}` does not accept this mutation")]
    Unsupported(ElementId),
    #[error("surface clone failed: {0}")]
    Clone(String),
    #[error("surface save failed: {0}")]
    Save(String),
}

/// Host-side view of one open diagram. The engine reads fresh snapshots
/// through `nodes`/`edges`, computes a full result, and only then applies
/// it through the mutators. A failed pass must leave the surface untouched,
/// so no mutator is called before the whole result exists.
pub trait DiagramSurface {
    /// Snapshot of all nodes in declaration order.
    fn nodes(&self) -> Vec<DiagramNode>;

    /// Snapshot of all edges in declaration order.
    fn edges(&self) -> Vec<DiagramEdge>;

    /// Moves a node so its top-left corner lands on `origin`.
    fn apply_position(&mut self, id: &ElementId, origin: Point) -> Result<(), SurfaceError>;

    /// Replaces an edge's route.
    fn apply_waypoints(&mut self, id: &ElementId, waypoints: &[Point]) -> Result<(), SurfaceError>;

    /// Moves the label attached to the node or edge `id`. The orientation,
    /// when supplied, records which side of the owner the label settled on.
    fn apply_label_bounds(
        &mut self,
        id: &ElementId,
        bounds: Rect,
        orientation: Option<LabelOrientation>,
    ) -> Result<(), SurfaceError>;

    /// Sets a container or node box outright. Used by container autosizing.
    fn resize(&mut self, id: &ElementId, rect: Rect) -> Result<(), SurfaceError>;

    /// Persists applied mutations to the host document.
    fn save(&mut self) -> Result<(), SurfaceError>;

    /// Independent copy for what-if passes. Mutations on the clone must not
    /// reach the original.
    fn clone_boxed(&self) -> Result<Box<dyn DiagramSurface>, SurfaceError>;
}

/// Surface backed by an owned [`Diagram`]. The reference implementation for
/// tests and for embedders that hold diagrams in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDiagram {
    diagram: Diagram,
    save_count: u32,
}

impl MemoryDiagram {
    pub fn new(diagram: Diagram) -> Self {
        Self {
            diagram,
            save_count: 0,
        }
    }

    pub fn diagram(&self) -> &Diagram {
        &self.diagram
    }

    pub fn save_count(&self) -> u32 {
        self.save_count
    }
}

impl DiagramSurface for MemoryDiagram {
    fn nodes(&self) -> Vec<DiagramNode> {
        self.diagram.nodes().cloned().collect()
    }

    fn edges(&self) -> Vec<DiagramEdge> {
        self.diagram.edges().cloned().collect()
    }

    fn apply_position(&mut self, id: &ElementId, origin: Point) -> Result<(), SurfaceError> {
        let node = self
            .diagram
            .node_mut(id)
            .ok_or_else(|| SurfaceError::NotFound(id.clone()))?;
        node.rect.x = origin.x;
        node.rect.y = origin.y;
        Ok(())
    }

    fn apply_waypoints(&mut self, id: &ElementId, waypoints: &[Point]) -> Result<(), SurfaceError> {
        let edge = self
            .diagram
            .edge_mut(id)
            .ok_or_else(|| SurfaceError::NotFound(id.clone()))?;
        edge.waypoints = waypoints.to_vec();
        Ok(())
    }

    fn apply_label_bounds(
        &mut self,
        id: &ElementId,
        bounds: Rect,
        orientation: Option<LabelOrientation>,
    ) -> Result<(), SurfaceError> {
        if let Some(node) = self.diagram.node_mut(id) {
            let label = node
                .label
                .as_mut()
                .ok_or_else(|| SurfaceError::Unsupported(id.clone()))?;
            label.rect = bounds;
            label.orientation = orientation;
            return Ok(());
        }
        if let Some(edge) = self.diagram.edge_mut(id) {
            let label = edge
                .label
                .as_mut()
                .ok_or_else(|| SurfaceError::Unsupported(id.clone()))?;
            label.rect = bounds;
            label.orientation = orientation;
            return Ok(());
        }
        Err(SurfaceError::NotFound(id.clone()))
    }

    fn resize(&mut self, id: &ElementId, rect: Rect) -> Result<(), SurfaceError> {
        let node = self
            .diagram
            .node_mut(id)
            .ok_or_else(|| SurfaceError::NotFound(id.clone()))?;
        node.rect = rect;
        Ok(())
    }

    fn save(&mut self) -> Result<(), SurfaceError> {
        self.save_count += 1;
        Ok(())
    }

    fn clone_boxed(&self) -> Result<Box<dyn DiagramSurface>, SurfaceError> {
        Ok(Box::new(self.clone()))
    }
}
