use std::collections::{BTreeMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};

use dagre_rust::{
    GraphConfig as DagreConfig, GraphEdge as DagreEdge, GraphNode as DagreNode,
    layout as dagre_layout,
};
use graphlib_rust::{Graph as DagreGraph, GraphOption};
use thiserror::Error;

use crate::geometry::Point;
use crate::model::{Direction, ElementId};

/// Node handed to the solver. Sizes are in diagram units; `fixed` carries
/// the center of a node that must not move but should still shape ranks
/// around itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverNode {
    pub id: ElementId,
    pub width: f32,
    pub height: f32,
    pub order: Option<usize>,
    pub partition: Option<ElementId>,
    pub fixed: Option<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverEdge {
    pub source: ElementId,
    pub target: ElementId,
}

/// Grouping constraint. Members of one partition are kept together by the
/// solver; nested partitions express pool-and-lane hierarchies.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverPartition {
    pub id: ElementId,
    pub parent: Option<ElementId>,
    pub order: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverGraph {
    pub direction: Direction,
    pub node_spacing: f32,
    pub layer_spacing: f32,
    pub margin: f32,
    pub nodes: Vec<SolverNode>,
    pub edges: Vec<SolverEdge>,
    pub partitions: Vec<SolverPartition>,
}

impl SolverGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Center positions keyed by node id. BTreeMap keeps read-out order stable
/// for the passes downstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverOutput {
    pub centers: BTreeMap<ElementId, Point>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolverError {
    #[error("solver panicked: {0}")]
    Panicked(String),
    #[error("solver returned malformed output: {0}")]
    MalformedOutput(String),
}

/// Layered-layout port. Implementations take the prepared graph and return
/// a center per node; everything else (routing, labels, containers) stays
/// on the engine side.
pub trait LayoutSolver {
    fn solve(&self, graph: &SolverGraph) -> Result<SolverOutput, SolverError>;
}

/// Default solver backed by the dagre port. The library is treated as
/// opaque: panics are caught and surfaced as [`SolverError::Panicked`], and
/// its output is validated before anything downstream sees it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DagreSolver;

impl DagreSolver {
    pub fn new() -> Self {
        Self
    }
}

fn dagre_rankdir(direction: Direction) -> &'static str {
    match direction {
        Direction::TopDown => "tb",
        Direction::BottomTop => "bt",
        Direction::LeftRight => "lr",
        Direction::RightLeft => "rl",
    }
}

impl LayoutSolver for DagreSolver {
    fn solve(&self, graph: &SolverGraph) -> Result<SolverOutput, SolverError> {
        if graph.is_empty() {
            return Ok(SolverOutput::default());
        }

        let compound_enabled = !graph.partitions.is_empty();
        let mut dagre_graph: DagreGraph<DagreConfig, DagreNode, DagreEdge> =
            DagreGraph::new(Some(GraphOption {
                directed: Some(true),
                multigraph: Some(false),
                compound: Some(compound_enabled),
            }));

        let mut graph_config = DagreConfig::default();
        graph_config.rankdir = Some(dagre_rankdir(graph.direction).to_string());
        graph_config.nodesep = Some(graph.node_spacing);
        graph_config.ranksep = Some(graph.layer_spacing);
        graph_config.marginx = Some(graph.margin);
        graph_config.marginy = Some(graph.margin);
        dagre_graph.set_graph(graph_config);

        for node in &graph.nodes {
            let mut dagre_node = DagreNode::default();
            dagre_node.width = node.width;
            dagre_node.height = node.height;
            dagre_node.order = node.order;
            dagre_graph.set_node(node.id.to_string(), Some(dagre_node));
        }

        if compound_enabled {
            for partition in &graph.partitions {
                let mut anchor = DagreNode::default();
                anchor.order = partition.order;
                dagre_graph.set_node(partition.id.to_string(), Some(anchor));
            }
            for partition in &graph.partitions {
                if let Some(parent) = &partition.parent {
                    let child = partition.id.to_string();
                    let _ = dagre_graph.set_parent(&child, Some(parent.to_string()));
                }
            }
            for node in &graph.nodes {
                if let Some(partition) = &node.partition {
                    let child = node.id.to_string();
                    let _ = dagre_graph.set_parent(&child, Some(partition.to_string()));
                }
            }

            // Chain top-level sibling partitions with invisible edges so
            // disconnected groups cannot land on top of each other.
            let top_level: Vec<&SolverPartition> = graph
                .partitions
                .iter()
                .filter(|p| p.parent.is_none())
                .collect();
            for pair in top_level.windows(2) {
                let mut spacer = DagreEdge::default();
                spacer.minlen = Some(1.0);
                let from = pair[0].id.to_string();
                let to = pair[1].id.to_string();
                let _ = dagre_graph.set_edge(&from, &to, Some(spacer), None);
            }
        }

        let mut edge_set: HashSet<(&ElementId, &ElementId)> = HashSet::new();
        for edge in &graph.edges {
            if !edge_set.insert((&edge.source, &edge.target)) {
                continue;
            }
            let from = edge.source.to_string();
            let to = edge.target.to_string();
            let dagre_edge = DagreEdge::default();
            let _ = dagre_graph.set_edge(&from, &to, Some(dagre_edge), None);
        }

        let run = catch_unwind(AssertUnwindSafe(|| {
            dagre_layout::run_layout(&mut dagre_graph);
        }));
        if let Err(payload) = run {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            return Err(SolverError::Panicked(message));
        }

        let mut centers = BTreeMap::new();
        for node in &graph.nodes {
            if let Some(fixed) = node.fixed {
                centers.insert(node.id.clone(), fixed);
                continue;
            }
            let key = node.id.to_string();
            let dagre_node = dagre_graph.node(&key).ok_or_else(|| {
                SolverError::MalformedOutput(format!("no position for `{}`", node.id))
            })?;
            if !dagre_node.x.is_finite() || !dagre_node.y.is_finite() {
                return Err(SolverError::MalformedOutput(format!(
                    "non-finite position for `{}`",
                    node.id
                )));
            }
            centers.insert(node.id.clone(), Point::new(dagre_node.x, dagre_node.y));
        }
        Ok(SolverOutput { centers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_graph(direction: Direction) -> SolverGraph {
        let nodes = ["a", "b", "c"]
            .iter()
            .map(|id| SolverNode {
                id: (*id).into(),
                width: 80.0,
                height: 40.0,
                order: None,
                partition: None,
                fixed: None,
            })
            .collect();
        let edges = vec![
            SolverEdge {
                source: "a".into(),
                target: "b".into(),
            },
            SolverEdge {
                source: "b".into(),
                target: "c".into(),
            },
        ];
        SolverGraph {
            direction,
            node_spacing: 50.0,
            layer_spacing: 70.0,
            margin: 8.0,
            nodes,
            edges,
            partitions: Vec::new(),
        }
    }

    #[test]
    fn chain_ranks_advance_along_major_axis() {
        let result = DagreSolver::new().solve(&chain_graph(Direction::LeftRight)).unwrap();
        let a = result.centers[&"a".into()];
        let b = result.centers[&"b".into()];
        let c = result.centers[&"c".into()];
        assert!(a.x < b.x && b.x < c.x, "lr chain must advance in x");
        for p in [a, b, c] {
            assert!(p.x.is_finite() && p.y.is_finite());
        }
    }

    #[test]
    fn solve_is_deterministic() {
        let graph = chain_graph(Direction::TopDown);
        let first = DagreSolver::new().solve(&graph).unwrap();
        let second = DagreSolver::new().solve(&graph).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fixed_nodes_keep_their_center() {
        let mut graph = chain_graph(Direction::LeftRight);
        graph.nodes[1].fixed = Some(Point::new(321.0, 123.0));
        let result = DagreSolver::new().solve(&graph).unwrap();
        assert_eq!(result.centers[&"b".into()], Point::new(321.0, 123.0));
    }

    #[test]
    fn empty_graph_is_a_no_op() {
        let graph = SolverGraph {
            direction: Direction::LeftRight,
            node_spacing: 50.0,
            layer_spacing: 70.0,
            margin: 8.0,
            nodes: Vec::new(),
            edges: Vec::new(),
            partitions: Vec::new(),
        };
        let result = DagreSolver::new().solve(&graph).unwrap();
        assert!(result.centers.is_empty());
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut graph = chain_graph(Direction::LeftRight);
        graph.edges.push(SolverEdge {
            source: "a".into(),
            target: "b".into(),
        });
        let result = DagreSolver::new().solve(&graph).unwrap();
        assert_eq!(result.centers.len(), 3);
    }
}
