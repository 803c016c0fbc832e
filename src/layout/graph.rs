use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::LayoutError;
use crate::geometry::{Point, snap_to_grid};
use crate::model::{Diagram, ElementId, NodeKind};
use crate::session::PinSet;
use crate::solver::{SolverEdge, SolverGraph, SolverNode, SolverPartition};

use super::types::{LaneStrategy, LayoutRequest, Scope};

/// Resolved view of one request's scope: which elements move, which stand
/// still, and which downstream passes touch what. Built once per pass and
/// shared by every stage.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScopePlan {
    /// Container whose children are being laid out, for container scopes.
    pub frame: Option<ElementId>,
    /// Flow nodes the solver may move, in declaration order.
    pub movable: Vec<ElementId>,
    /// Flow nodes kept in the solver graph as immovable obstacles: pinned,
    /// authored-fixed, or left out of an element scope's selection.
    pub fixed: Vec<ElementId>,
    /// Boundary node -> host. These ride along with their host's move.
    pub followers: BTreeMap<ElementId, ElementId>,
    /// Pinned ids named by an element scope, dropped and reported.
    pub pinned_skipped: Vec<ElementId>,
    /// Edges whose routes are recomputed.
    pub reroute: Vec<ElementId>,
    /// Pinned edges in scope whose waypoints must survive untouched.
    pub pinned_edges: Vec<ElementId>,
    /// Nodes whose labels are re-placed.
    pub label_nodes: Vec<ElementId>,
    /// Containers to autosize, innermost first.
    pub autosize: Vec<ElementId>,
}

impl ScopePlan {
    pub fn movable_set(&self) -> HashSet<&ElementId> {
        self.movable.iter().collect()
    }
}

/// Classifies every element of the diagram against the request scope.
/// Fails with [`LayoutError::UnknownElement`] before anything runs when the
/// scope names an id the diagram does not have.
pub(crate) fn plan_scope(
    diagram: &Diagram,
    scope: &Scope,
    pins: &PinSet,
) -> Result<ScopePlan, LayoutError> {
    let mut plan = ScopePlan::default();

    match scope {
        Scope::Whole(_) => {
            classify_region(diagram, None, pins, &mut plan);
        }
        Scope::Container { container_id } => {
            let container = diagram
                .node(container_id)
                .ok_or_else(|| LayoutError::UnknownElement(container_id.clone()))?;
            if !container.kind.is_container() && container.kind != NodeKind::Lane {
                return Err(LayoutError::UnknownElement(container_id.clone()));
            }
            plan.frame = Some(container_id.clone());
            classify_region(diagram, Some(container_id), pins, &mut plan);
            push_frame_autosize(diagram, container_id, &mut plan);
        }
        Scope::Elements { element_ids } => {
            classify_elements(diagram, element_ids, pins, &mut plan)?;
        }
    }

    resolve_followers(diagram, pins, &mut plan);
    collect_edges(diagram, scope, pins, &mut plan);
    collect_label_nodes(diagram, &mut plan);
    if matches!(scope, Scope::Elements { .. }) {
        push_unselected_obstacles(diagram, &mut plan);
    }
    order_autosize_innermost_first(diagram, &mut plan.autosize);

    debug!(
        movable = plan.movable.len(),
        fixed = plan.fixed.len(),
        followers = plan.followers.len(),
        reroute = plan.reroute.len(),
        autosize = plan.autosize.len(),
        "scope resolved"
    );
    Ok(plan)
}

fn classify_region(
    diagram: &Diagram,
    frame: Option<&ElementId>,
    pins: &PinSet,
    plan: &mut ScopePlan,
) {
    for node in diagram.nodes() {
        if let Some(frame_id) = frame
            && !diagram.is_within(&node.id, frame_id)
        {
            continue;
        }
        if node.kind.is_container() {
            plan.autosize.push(node.id.clone());
            continue;
        }
        if !node.kind.participates_in_flow() {
            continue;
        }
        if node.kind == NodeKind::Boundary {
            // Resolved against movable hosts afterwards.
            continue;
        }
        if pins.is_pinned(&node.id) || node.fixed {
            plan.fixed.push(node.id.clone());
        } else {
            plan.movable.push(node.id.clone());
        }
    }
}

fn classify_elements(
    diagram: &Diagram,
    element_ids: &[ElementId],
    pins: &PinSet,
    plan: &mut ScopePlan,
) -> Result<(), LayoutError> {
    let mut seen: HashSet<&ElementId> = HashSet::new();
    for id in element_ids {
        if !seen.insert(id) {
            continue;
        }
        if let Some(node) = diagram.node(id) {
            if pins.is_pinned(id) {
                plan.pinned_skipped.push(id.clone());
                continue;
            }
            match node.kind {
                NodeKind::Pool | NodeKind::Subprocess => plan.autosize.push(id.clone()),
                NodeKind::Lane => {
                    if let Some(pool) = &node.parent {
                        plan.autosize.push(pool.clone());
                    }
                }
                NodeKind::Boundary => {}
                _ if node.fixed => plan.fixed.push(id.clone()),
                _ => plan.movable.push(id.clone()),
            }
        } else if let Some(edge) = diagram.edge(id) {
            if pins.is_pinned(&edge.id) {
                plan.pinned_skipped.push(id.clone());
            } else {
                plan.reroute.push(id.clone());
            }
        } else {
            return Err(LayoutError::UnknownElement(id.clone()));
        }
    }
    Ok(())
}

/// Flow nodes an element scope did not name still occupy canvas, so they
/// enter the solver graph as immovable obstacles. They join after label and
/// edge collection: their boxes shape the solve, nothing else about them is
/// touched.
fn push_unselected_obstacles(diagram: &Diagram, plan: &mut ScopePlan) {
    let classified: HashSet<ElementId> = plan
        .movable
        .iter()
        .chain(plan.fixed.iter())
        .cloned()
        .collect();
    for node in diagram.nodes() {
        if node.kind.is_container() || !node.kind.participates_in_flow() {
            continue;
        }
        if node.kind == NodeKind::Boundary || classified.contains(&node.id) {
            continue;
        }
        plan.fixed.push(node.id.clone());
    }
}

fn push_frame_autosize(diagram: &Diagram, frame: &ElementId, plan: &mut ScopePlan) {
    let Some(node) = diagram.node(frame) else {
        return;
    };
    if node.kind.is_container() {
        plan.autosize.push(frame.clone());
    } else if node.kind == NodeKind::Lane
        && let Some(pool) = &node.parent
        && diagram.node(pool).is_some_and(|p| p.kind.is_container())
    {
        plan.autosize.push(pool.clone());
    }
}

/// Boundary nodes attached to a movable host move with it; pinned boundary
/// nodes stay where they are regardless of the host.
fn resolve_followers(diagram: &Diagram, pins: &PinSet, plan: &mut ScopePlan) {
    let movable: HashSet<&ElementId> = plan.movable.iter().collect();
    for node in diagram.nodes() {
        if node.kind != NodeKind::Boundary || pins.is_pinned(&node.id) || node.fixed {
            continue;
        }
        if let Some(host) = &node.parent
            && movable.contains(host)
        {
            plan.followers.insert(node.id.clone(), host.clone());
        }
    }
}

fn collect_edges(diagram: &Diagram, scope: &Scope, pins: &PinSet, plan: &mut ScopePlan) {
    let moving: HashSet<&ElementId> = plan
        .movable
        .iter()
        .chain(plan.followers.keys())
        .collect();
    let explicit: HashSet<&ElementId> = plan.reroute.iter().collect();
    let mut reroute: Vec<ElementId> = Vec::new();
    for edge in diagram.edges() {
        let touches_move = moving.contains(&edge.source) || moving.contains(&edge.target);
        if !touches_move && !explicit.contains(&edge.id) {
            continue;
        }
        if pins.is_pinned(&edge.id) {
            plan.pinned_edges.push(edge.id.clone());
            continue;
        }
        reroute.push(edge.id.clone());
    }
    // Full scope also refreshes routes between fixed nodes so one committed
    // pass leaves every flow in canonical shape.
    if scope.is_full() {
        let covered: HashSet<ElementId> = reroute.iter().cloned().collect();
        for edge in diagram.edges() {
            if covered.contains(&edge.id) || pins.is_pinned(&edge.id) {
                continue;
            }
            reroute.push(edge.id.clone());
        }
    }
    plan.reroute = reroute;
}

fn collect_label_nodes(diagram: &Diagram, plan: &mut ScopePlan) {
    let in_scope: HashSet<&ElementId> = plan
        .movable
        .iter()
        .chain(plan.fixed.iter())
        .chain(plan.followers.keys())
        .collect();
    plan.label_nodes = diagram
        .nodes()
        .filter(|n| n.label.is_some() && in_scope.contains(&n.id))
        .map(|n| n.id.clone())
        .collect();
}

fn order_autosize_innermost_first(diagram: &Diagram, autosize: &mut Vec<ElementId>) {
    let mut seen: HashSet<ElementId> = HashSet::new();
    autosize.retain(|id| seen.insert(id.clone()));
    let depth = |id: &ElementId| -> usize {
        let mut depth = 0usize;
        let mut current = diagram.node(id).and_then(|n| n.parent.as_ref());
        while let Some(parent) = current {
            depth += 1;
            if depth > diagram.node_count() {
                break;
            }
            current = diagram.node(parent).and_then(|n| n.parent.as_ref());
        }
        depth
    };
    autosize.sort_by_key(|id| std::cmp::Reverse(depth(id)));
}

/// Builds the solver input from the resolved scope. Boundary events do not
/// become solver nodes; edges touching them are remapped onto the host so
/// exception handlers still rank after the hosting task.
pub(crate) fn build_solver_graph(
    diagram: &Diagram,
    plan: &ScopePlan,
    request: &LayoutRequest,
    config: &EngineConfig,
) -> SolverGraph {
    let mut order_of: BTreeMap<&ElementId, usize> = BTreeMap::new();
    for (idx, node) in diagram.nodes().enumerate() {
        order_of.insert(&node.id, idx);
    }

    let partitions = collect_partitions(diagram, plan, request);
    let partition_ids: HashSet<&ElementId> = partitions.iter().map(|p| &p.id).collect();

    let mut nodes: Vec<SolverNode> = Vec::new();
    let mut in_graph: HashSet<&ElementId> = HashSet::new();
    for id in plan.movable.iter().chain(plan.fixed.iter()) {
        let Some(node) = diagram.node(id) else {
            continue;
        };
        let fixed = plan
            .fixed
            .iter()
            .any(|f| f == id)
            .then(|| node.rect.center());
        nodes.push(SolverNode {
            id: id.clone(),
            width: node.rect.width,
            height: node.rect.height,
            order: order_of.get(id).copied(),
            partition: nearest_partition(diagram, id, &partition_ids, plan.frame.as_ref()),
            fixed,
        });
        in_graph.insert(id);
    }

    let mut edges: Vec<SolverEdge> = Vec::new();
    for edge in diagram.edges() {
        let source = remap_endpoint(&edge.source, plan);
        let target = remap_endpoint(&edge.target, plan);
        if source == target {
            continue;
        }
        if !in_graph.contains(source) || !in_graph.contains(target) {
            continue;
        }
        edges.push(SolverEdge {
            source: source.clone(),
            target: target.clone(),
        });
    }

    SolverGraph {
        direction: request.direction,
        node_spacing: config.spacing.node_spacing,
        layer_spacing: config.spacing.layer_spacing,
        margin: config.spacing.margin,
        nodes,
        edges,
        partitions,
    }
}

fn remap_endpoint<'a>(id: &'a ElementId, plan: &'a ScopePlan) -> &'a ElementId {
    plan.followers.get(id).unwrap_or(id)
}

fn collect_partitions(
    diagram: &Diagram,
    plan: &ScopePlan,
    request: &LayoutRequest,
) -> Vec<SolverPartition> {
    let in_graph: HashSet<&ElementId> = plan.movable.iter().chain(plan.fixed.iter()).collect();
    let mut partitions: Vec<SolverPartition> = Vec::new();
    let mut included: HashSet<ElementId> = HashSet::new();

    let hosts_graph_node = |candidate: &ElementId| -> bool {
        in_graph
            .iter()
            .any(|id| diagram.is_within(id, candidate))
    };

    for node in diagram.nodes() {
        if plan.frame.as_ref() == Some(&node.id) {
            continue;
        }
        let groupable = match node.kind {
            NodeKind::Pool | NodeKind::Subprocess => true,
            NodeKind::Lane => request.lane_strategy == LaneStrategy::Preserve,
            _ => false,
        };
        if !groupable || !hosts_graph_node(&node.id) {
            continue;
        }
        included.insert(node.id.clone());
        partitions.push(SolverPartition {
            id: node.id.clone(),
            parent: None,
            order: None,
        });
    }

    // Resolve nesting and lane order now that the member set is final.
    for partition in &mut partitions {
        let node = diagram.node(&partition.id);
        partition.parent = node
            .and_then(|n| n.parent.as_ref())
            .filter(|p| included.contains(*p))
            .cloned();
        if let Some(node) = node
            && node.kind == NodeKind::Lane
            && let Some(pool) = node.parent.as_ref().and_then(|p| diagram.node(p))
            && let Some(info) = &pool.container
        {
            partition.order = info.lanes.iter().position(|lane| lane == &node.id);
        }
    }
    partitions
}

/// Highest-resolution partition an element belongs to: its lane when lanes
/// partition the graph, otherwise the owning pool or subprocess.
fn nearest_partition(
    diagram: &Diagram,
    id: &ElementId,
    partition_ids: &HashSet<&ElementId>,
    frame: Option<&ElementId>,
) -> Option<ElementId> {
    let mut current = diagram.node(id).and_then(|n| n.parent.as_ref());
    let mut hops = 0usize;
    while let Some(parent) = current {
        if Some(parent) == frame {
            return None;
        }
        if partition_ids.contains(parent) {
            return Some(parent.clone());
        }
        hops += 1;
        if hops > diagram.node_count() {
            return None;
        }
        current = diagram.node(parent).and_then(|n| n.parent.as_ref());
    }
    None
}

/// Writes solved centers back into the working diagram. The solved cloud is
/// re-anchored so its bounding-box origin matches the pre-layout origin of
/// the same nodes, which keeps scoped relayouts in place instead of
/// teleporting content to the solver's origin.
pub(crate) fn apply_solved_positions(
    diagram: &mut Diagram,
    plan: &ScopePlan,
    centers: &BTreeMap<ElementId, Point>,
    grid: f32,
) {
    let mut old_min: Option<Point> = None;
    let mut new_min: Option<Point> = None;
    for id in &plan.movable {
        let (Some(node), Some(center)) = (diagram.node(id), centers.get(id)) else {
            continue;
        };
        let new_origin = Point::new(
            center.x - node.rect.width / 2.0,
            center.y - node.rect.height / 2.0,
        );
        old_min = Some(match old_min {
            Some(p) => Point::new(p.x.min(node.rect.x), p.y.min(node.rect.y)),
            None => Point::new(node.rect.x, node.rect.y),
        });
        new_min = Some(match new_min {
            Some(p) => Point::new(p.x.min(new_origin.x), p.y.min(new_origin.y)),
            None => new_origin,
        });
    }
    let (Some(old_min), Some(new_min)) = (old_min, new_min) else {
        return;
    };
    let offset = Point::new(old_min.x - new_min.x, old_min.y - new_min.y);

    let mut host_moves: BTreeMap<ElementId, Point> = BTreeMap::new();
    for id in &plan.movable {
        let Some(center) = centers.get(id) else {
            continue;
        };
        let Some(node) = diagram.node_mut(id) else {
            continue;
        };
        let old_origin = Point::new(node.rect.x, node.rect.y);
        node.rect.x = snap_to_grid(center.x - node.rect.width / 2.0 + offset.x, grid);
        node.rect.y = snap_to_grid(center.y - node.rect.height / 2.0 + offset.y, grid);
        host_moves.insert(
            id.clone(),
            Point::new(node.rect.x - old_origin.x, node.rect.y - old_origin.y),
        );
    }

    // Boundary events keep their offset on the host border, so they take
    // the host's delta verbatim, unsnapped.
    for (follower, host) in &plan.followers {
        let Some(delta) = host_moves.get(host).copied() else {
            continue;
        };
        if let Some(node) = diagram.node_mut(follower) {
            node.rect.x += delta.x;
            node.rect.y += delta.y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::model::{ContainerInfo, DiagramEdge, DiagramNode, Label};

    fn pooled_diagram() -> Diagram {
        let mut d = Diagram::new();
        d.insert_node(
            DiagramNode::new("pool", NodeKind::Pool, Rect::new(0.0, 0.0, 600.0, 300.0))
                .with_container(ContainerInfo {
                    lanes: vec!["lane_a".into(), "lane_b".into()],
                    min_size: None,
                }),
        );
        d.insert_node(
            DiagramNode::new("lane_a", NodeKind::Lane, Rect::new(30.0, 0.0, 570.0, 150.0))
                .with_parent("pool"),
        );
        d.insert_node(
            DiagramNode::new(
                "lane_b",
                NodeKind::Lane,
                Rect::new(30.0, 150.0, 570.0, 150.0),
            )
            .with_parent("pool"),
        );
        d.insert_node(
            DiagramNode::new("start", NodeKind::Event, Rect::new(60.0, 60.0, 36.0, 36.0))
                .with_parent("lane_a"),
        );
        d.insert_node(
            DiagramNode::new("work", NodeKind::Task, Rect::new(160.0, 55.0, 80.0, 46.0))
                .with_parent("lane_a"),
        );
        d.insert_node(
            DiagramNode::new("review", NodeKind::Task, Rect::new(160.0, 200.0, 80.0, 46.0))
                .with_parent("lane_b"),
        );
        d.insert_node(
            DiagramNode::new("oops", NodeKind::Boundary, Rect::new(230.0, 92.0, 24.0, 24.0))
                .with_parent("work"),
        );
        d.insert_node(DiagramNode::new(
            "handler",
            NodeKind::Task,
            Rect::new(300.0, 120.0, 80.0, 46.0),
        ));
        d.insert_edge(DiagramEdge::new("f1", "start", "work"));
        d.insert_edge(DiagramEdge::new("f2", "work", "review"));
        d.insert_edge(DiagramEdge::new("f3", "oops", "handler"));
        d
    }

    #[test]
    fn full_scope_classifies_kinds() {
        let d = pooled_diagram();
        let plan = plan_scope(&d, &Scope::full(), &PinSet::new()).unwrap();
        assert_eq!(plan.movable, vec!["start".into(), "work".into(), "review".into(), "handler".into()]);
        assert_eq!(plan.followers.get(&"oops".into()), Some(&"work".into()));
        assert_eq!(plan.autosize, vec!["pool".into()]);
        assert!(plan.fixed.is_empty());
        assert_eq!(plan.reroute.len(), 3, "all edges rerouted on full scope");
    }

    #[test]
    fn unknown_scope_id_fails_fast() {
        let d = pooled_diagram();
        let err = plan_scope(&d, &Scope::elements(["start", "ghost"]), &PinSet::new()).unwrap_err();
        assert_eq!(err, LayoutError::UnknownElement("ghost".into()));
        let err = plan_scope(&d, &Scope::container("ghost"), &PinSet::new()).unwrap_err();
        assert_eq!(err, LayoutError::UnknownElement("ghost".into()));
    }

    #[test]
    fn container_scope_restricts_to_descendants() {
        let d = pooled_diagram();
        let plan = plan_scope(&d, &Scope::container("pool"), &PinSet::new()).unwrap();
        assert_eq!(plan.movable, vec!["start".into(), "work".into(), "review".into()]);
        assert!(
            !plan.movable.contains(&"handler".into()),
            "handler sits outside the pool"
        );
    }

    #[test]
    fn element_scope_drops_pinned_and_reports_them() {
        let d = pooled_diagram();
        let mut pins = PinSet::new();
        pins.pin("work");
        let plan = plan_scope(&d, &Scope::elements(["start", "work"]), &pins).unwrap();
        assert_eq!(plan.movable, vec!["start".into()]);
        assert_eq!(plan.pinned_skipped, vec!["work".into()]);
    }

    #[test]
    fn element_scope_keeps_unselected_nodes_as_obstacles() {
        let mut d = Diagram::new();
        d.insert_node(DiagramNode::new(
            "a",
            NodeKind::Task,
            Rect::new(0.0, 80.0, 80.0, 40.0),
        ));
        d.insert_node(
            DiagramNode::new("o", NodeKind::Task, Rect::new(140.0, 80.0, 80.0, 40.0))
                .with_label(Label::new("Hold", Rect::new(150.0, 60.0, 60.0, 14.0))),
        );
        d.insert_node(DiagramNode::new(
            "b",
            NodeKind::Task,
            Rect::new(280.0, 80.0, 80.0, 40.0),
        ));
        d.insert_edge(DiagramEdge::new("f1", "a", "o"));
        d.insert_edge(DiagramEdge::new("f2", "o", "b"));

        let plan = plan_scope(&d, &Scope::elements(["a", "b"]), &PinSet::new()).unwrap();
        assert_eq!(plan.movable, vec!["a".into(), "b".into()]);
        assert_eq!(plan.fixed, vec!["o".into()]);
        assert!(
            plan.label_nodes.is_empty(),
            "unselected nodes keep their labels untouched"
        );

        let graph = build_solver_graph(&d, &plan, &LayoutRequest::full(), &EngineConfig::default());
        let held = graph.nodes.iter().find(|n| n.id == "o".into()).unwrap();
        assert_eq!(held.fixed, Some(Point::new(180.0, 100.0)));
        assert!(
            graph
                .edges
                .iter()
                .any(|e| e.source == "a".into() && e.target == "o".into()),
            "flows into held nodes still shape the solve"
        );
    }

    #[test]
    fn full_scope_refreshes_routes_between_held_nodes() {
        let d = pooled_diagram();
        let mut pins = PinSet::new();
        pins.pin("start");
        pins.pin("work");
        pins.pin("f2");
        let plan = plan_scope(&d, &Scope::full(), &pins).unwrap();
        assert_eq!(
            plan.reroute,
            vec!["f3".into(), "f1".into()],
            "flows between held nodes are refreshed once, without duplicates"
        );
        assert_eq!(plan.pinned_edges, vec!["f2".into()]);
    }

    #[test]
    fn authored_fixed_flag_holds_a_node() {
        let mut d = pooled_diagram();
        d.node_mut(&"review".into()).unwrap().fixed = true;
        let plan = plan_scope(&d, &Scope::full(), &PinSet::new()).unwrap();
        assert!(plan.fixed.contains(&"review".into()));
        assert!(!plan.movable.contains(&"review".into()));
        assert!(
            plan.pinned_skipped.is_empty(),
            "authored holds are not session pins"
        );
    }

    #[test]
    fn full_scope_marks_pinned_as_fixed() {
        let d = pooled_diagram();
        let mut pins = PinSet::new();
        pins.pin("work");
        let plan = plan_scope(&d, &Scope::full(), &pins).unwrap();
        assert!(plan.fixed.contains(&"work".into()));
        assert!(!plan.movable.contains(&"work".into()));
        let graph = build_solver_graph(&d, &plan, &LayoutRequest::full(), &EngineConfig::default());
        let fixed = graph
            .nodes
            .iter()
            .find(|n| n.id == "work".into())
            .unwrap();
        assert!(fixed.fixed.is_some());
    }

    #[test]
    fn boundary_edges_remap_to_host() {
        let d = pooled_diagram();
        let plan = plan_scope(&d, &Scope::full(), &PinSet::new()).unwrap();
        let graph = build_solver_graph(&d, &plan, &LayoutRequest::full(), &EngineConfig::default());
        assert!(
            graph
                .edges
                .iter()
                .any(|e| e.source == "work".into() && e.target == "handler".into()),
            "boundary flow must rank the handler after the host task"
        );
        assert!(graph.nodes.iter().all(|n| n.id != "oops".into()));
    }

    #[test]
    fn lanes_partition_when_preserved() {
        let d = pooled_diagram();
        let plan = plan_scope(&d, &Scope::full(), &PinSet::new()).unwrap();
        let request = LayoutRequest::full();
        let graph = build_solver_graph(&d, &plan, &request, &EngineConfig::default());
        let lane_ids: Vec<&str> = graph.partitions.iter().map(|p| p.id.as_str()).collect();
        assert!(lane_ids.contains(&"pool"));
        assert!(lane_ids.contains(&"lane_a"));
        assert!(lane_ids.contains(&"lane_b"));
        let work = graph.nodes.iter().find(|n| n.id == "work".into()).unwrap();
        assert_eq!(work.partition, Some("lane_a".into()));
        let lane = graph
            .partitions
            .iter()
            .find(|p| p.id == "lane_b".into())
            .unwrap();
        assert_eq!(lane.parent, Some("pool".into()));
        assert_eq!(lane.order, Some(1));
    }

    #[test]
    fn optimize_flattens_lanes() {
        let d = pooled_diagram();
        let plan = plan_scope(&d, &Scope::full(), &PinSet::new()).unwrap();
        let mut request = LayoutRequest::full();
        request.lane_strategy = LaneStrategy::Optimize;
        let graph = build_solver_graph(&d, &plan, &request, &EngineConfig::default());
        assert!(graph.partitions.iter().all(|p| p.id != "lane_a".into()));
        let work = graph.nodes.iter().find(|n| n.id == "work".into()).unwrap();
        assert_eq!(work.partition, Some("pool".into()));
    }

    #[test]
    fn solved_positions_reanchor_to_old_origin() {
        let mut d = Diagram::new();
        d.insert_node(DiagramNode::new(
            "a",
            NodeKind::Task,
            Rect::new(100.0, 100.0, 80.0, 40.0),
        ));
        d.insert_node(DiagramNode::new(
            "b",
            NodeKind::Task,
            Rect::new(240.0, 100.0, 80.0, 40.0),
        ));
        d.insert_edge(DiagramEdge::new("f", "a", "b"));
        let plan = plan_scope(&d, &Scope::full(), &PinSet::new()).unwrap();
        let mut centers = BTreeMap::new();
        centers.insert(ElementId::from("a"), Point::new(48.0, 28.0));
        centers.insert(ElementId::from("b"), Point::new(188.0, 28.0));
        apply_solved_positions(&mut d, &plan, &centers, 0.0);
        let a = d.node(&"a".into()).unwrap().rect;
        let b = d.node(&"b".into()).unwrap().rect;
        assert_eq!((a.x, a.y), (100.0, 100.0), "content origin preserved");
        assert_eq!((b.x, b.y), (240.0, 100.0));
    }

    #[test]
    fn followers_take_host_delta() {
        let mut d = pooled_diagram();
        let plan = plan_scope(&d, &Scope::full(), &PinSet::new()).unwrap();
        let before = d.node(&"oops".into()).unwrap().rect;
        let host_before = d.node(&"work".into()).unwrap().rect;
        let mut centers = BTreeMap::new();
        for id in &plan.movable {
            let rect = d.node(id).unwrap().rect;
            let mut center = rect.center();
            if id.as_str() == "work" {
                center = Point::new(center.x + 50.0, center.y + 10.0);
            }
            centers.insert(id.clone(), center);
        }
        apply_solved_positions(&mut d, &plan, &centers, 0.0);
        let after = d.node(&"oops".into()).unwrap().rect;
        let host_after = d.node(&"work".into()).unwrap().rect;
        let host_delta = (host_after.x - host_before.x, host_after.y - host_before.y);
        assert_eq!(after.x - before.x, host_delta.0);
        assert_eq!(after.y - before.y, host_delta.1);
    }
}
