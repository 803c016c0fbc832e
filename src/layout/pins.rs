use std::collections::BTreeMap;

use tracing::debug;

use crate::geometry::Point;
use crate::model::{Diagram, ElementId};

use super::graph::ScopePlan;

/// Waypoints of the pinned edges in scope, captured before any solving so
/// they can be written back verbatim at the end of the pass. Routing never
/// targets pinned edges, so this guards against downstream passes touching
/// shared geometry.
pub(crate) struct PinnedRoutes {
    routes: BTreeMap<ElementId, Vec<Point>>,
}

impl PinnedRoutes {
    pub fn capture(diagram: &Diagram, plan: &ScopePlan) -> Self {
        let mut routes = BTreeMap::new();
        for id in &plan.pinned_edges {
            if let Some(edge) = diagram.edge(id) {
                routes.insert(id.clone(), edge.waypoints.clone());
            }
        }
        Self { routes }
    }

    /// Writes every captured route back unchanged.
    pub fn restore(&self, diagram: &mut Diagram) {
        for (id, waypoints) in &self.routes {
            match diagram.edge_mut(id) {
                Some(edge) => edge.waypoints = waypoints.clone(),
                None => debug!(element = %id, "pinned edge vanished before restore"),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
