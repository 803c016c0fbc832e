use std::collections::HashMap;

use tracing::debug;

use crate::config::EngineConfig;
use crate::geometry::{Point, Rect, Size, point_at_fraction, polyline_intersects_rect};
use crate::model::{Diagram, DiagramNode, Direction, ElementId, Label, LabelOrientation, NodeKind};
use crate::text_metrics::estimate_label_size;

use super::graph::ScopePlan;

// ── Scoring weights ─────────────────────────────────────────────────
/// Candidate reaches into negative coordinate space.
const OFF_CANVAS_PENALTY: f32 = 100.0;
/// Candidate crosses a connection it does not belong to.
const FLOW_CROSS_PENALTY: f32 = 1.0;
/// Candidate overlaps another node's box.
const SHAPE_OVERLAP_PENALTY: f32 = 5.0;
/// Candidate sits within the proximity margin of a node without touching it.
const SHAPE_PROXIMITY_PENALTY: f32 = 1.0;
/// Candidate overlaps another label.
const LABEL_OVERLAP_PENALTY: f32 = 2.0;
/// Candidate overlaps the owner's host shape or its container's title band.
const HOST_OVERLAP_PENALTY: f32 = 10.0;

// ── Candidate geometry ──────────────────────────────────────────────
/// Edge label offset distances, in multiples of the base gap off the path.
const EDGE_OFFSET_STEPS: [f32; 2] = [1.0, 2.2];
/// Horizontal drift below which a label already counts as centered.
const RECENTER_SLACK: f32 = 0.5;

/// Places the labels of every scoped node and rerouted edge. A label only
/// moves when a candidate position scores strictly better than where it
/// already sits, so a settled diagram passes through unchanged. Returns how
/// many labels ended up at a new position.
pub(crate) fn place_labels(
    diagram: &mut Diagram,
    plan: &ScopePlan,
    direction: Direction,
    config: &EngineConfig,
) -> usize {
    let mut obstacles = collect_obstacles(diagram);
    let original = snapshot_positions(diagram, plan);
    let mut recenter = Vec::new();

    for id in &plan.label_nodes {
        match place_node_label(diagram, id, direction, config, &mut obstacles) {
            Some(true) => recenter.push(id.clone()),
            Some(false) => {}
            None => debug!(element = %id, "label placement skipped"),
        }
    }
    for id in &plan.reroute {
        if !diagram.edge(id).is_some_and(|e| e.label.is_some()) {
            continue;
        }
        if place_edge_label(diagram, id, config, &mut obstacles).is_none() {
            debug!(element = %id, "label placement skipped");
        }
    }
    recenter_pass(diagram, &recenter, direction, config, &mut obstacles);

    count_moves(diagram, plan, &original)
}

// ── Obstacle snapshot ───────────────────────────────────────────────

/// Everything a candidate box is scored against, captured once per pass.
/// Label boxes are updated in place as labels settle, so later labels see
/// where earlier ones landed.
struct Obstacles {
    shapes: Vec<(ElementId, Rect)>,
    flows: Vec<FlowObstacle>,
    labels: HashMap<ElementId, Rect>,
}

struct FlowObstacle {
    id: ElementId,
    source: ElementId,
    target: ElementId,
    points: Vec<Point>,
}

fn collect_obstacles(diagram: &Diagram) -> Obstacles {
    let mut shapes = Vec::new();
    let mut flows = Vec::new();
    let mut labels = HashMap::new();
    for node in diagram.nodes() {
        // Pools and lanes enclose their content; overlap with them is the
        // normal state and is handled by the host-band rule instead.
        if !matches!(node.kind, NodeKind::Pool | NodeKind::Lane) {
            shapes.push((node.id.clone(), node.rect));
        }
        if let Some(label) = &node.label
            && label.rect.width > 0.0
            && label.rect.height > 0.0
        {
            labels.insert(node.id.clone(), label.rect);
        }
    }
    for edge in diagram.edges() {
        if edge.waypoints.len() >= 2 {
            flows.push(FlowObstacle {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                points: edge.waypoints.clone(),
            });
        }
        if let Some(label) = &edge.label
            && label.rect.width > 0.0
            && label.rect.height > 0.0
        {
            labels.insert(edge.id.clone(), label.rect);
        }
    }
    Obstacles {
        shapes,
        flows,
        labels,
    }
}

fn snapshot_positions(diagram: &Diagram, plan: &ScopePlan) -> HashMap<ElementId, Point> {
    let mut map = HashMap::new();
    for id in &plan.label_nodes {
        if let Some(node) = diagram.node(id)
            && let Some(label) = &node.label
        {
            map.insert(id.clone(), Point::new(label.rect.x, label.rect.y));
        }
    }
    for id in &plan.reroute {
        if let Some(edge) = diagram.edge(id)
            && let Some(label) = &edge.label
        {
            map.insert(id.clone(), Point::new(label.rect.x, label.rect.y));
        }
    }
    map
}

fn count_moves(diagram: &Diagram, plan: &ScopePlan, original: &HashMap<ElementId, Point>) -> usize {
    let mut moved = 0;
    for id in &plan.label_nodes {
        if let Some(node) = diagram.node(id)
            && let Some(label) = &node.label
            && position_changed(original.get(id), &label.rect)
        {
            moved += 1;
        }
    }
    for id in &plan.reroute {
        if let Some(edge) = diagram.edge(id)
            && let Some(label) = &edge.label
            && position_changed(original.get(id), &label.rect)
        {
            moved += 1;
        }
    }
    moved
}

fn position_changed(before: Option<&Point>, after: &Rect) -> bool {
    match before {
        Some(p) => p.x != after.x || p.y != after.y,
        None => true,
    }
}

// ── Scoring ─────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Owner<'a> {
    Node(&'a ElementId),
    Edge(&'a ElementId),
}

impl<'a> Owner<'a> {
    fn id(self) -> &'a ElementId {
        match self {
            Owner::Node(id) | Owner::Edge(id) => id,
        }
    }

    fn owns_flow(self, flow: &FlowObstacle) -> bool {
        match self {
            Owner::Node(id) => flow.source == *id || flow.target == *id,
            Owner::Edge(id) => flow.id == *id,
        }
    }
}

struct Score {
    total: f32,
    own_flow: f32,
}

impl Score {
    fn clean(&self) -> bool {
        self.total == 0.0
    }

    /// The only thing wrong with the spot is the owner's own connection
    /// running through it.
    fn self_cross_only(&self) -> bool {
        self.total > 0.0 && self.total == self.own_flow
    }
}

fn score_candidate(
    rect: &Rect,
    owner: Owner<'_>,
    host: Option<&Rect>,
    obstacles: &Obstacles,
    config: &EngineConfig,
) -> Score {
    let mut total = 0.0;
    let mut own_flow = 0.0;
    if rect.x < 0.0 || rect.y < 0.0 {
        total += OFF_CANVAS_PENALTY;
    }
    for (id, shape) in &obstacles.shapes {
        if id == owner.id() {
            continue;
        }
        if rect.overlaps(shape) {
            total += SHAPE_OVERLAP_PENALTY;
        } else if rect.near(shape, config.labels.proximity_margin) {
            total += SHAPE_PROXIMITY_PENALTY;
        }
    }
    for flow in &obstacles.flows {
        if !polyline_intersects_rect(&flow.points, rect) {
            continue;
        }
        if owner.owns_flow(flow) {
            own_flow += config.labels.own_flow_penalty;
        } else {
            total += FLOW_CROSS_PENALTY;
        }
    }
    for (id, label) in &obstacles.labels {
        if id != owner.id() && rect.overlaps(label) {
            total += LABEL_OVERLAP_PENALTY;
        }
    }
    if let Some(zone) = host
        && rect.overlaps(zone)
    {
        total += HOST_OVERLAP_PENALTY;
    }
    Score {
        total: total + own_flow,
        own_flow,
    }
}

/// The region a label should stay out of on behalf of its host: the host
/// shape itself for boundary events, the title band for container children.
fn host_zone(
    diagram: &Diagram,
    owner: &DiagramNode,
    direction: Direction,
    config: &EngineConfig,
) -> Option<Rect> {
    if owner.kind == NodeKind::Boundary {
        let host = diagram.node(owner.parent.as_ref()?)?;
        return Some(host.rect);
    }
    let mut cursor = owner.parent.as_ref();
    let mut hops = 0;
    while let Some(id) = cursor {
        let node = diagram.node(id)?;
        if node.kind.is_container() {
            let band = if direction.is_horizontal() {
                Rect::new(
                    node.rect.x,
                    node.rect.y,
                    config.containers.header_padding,
                    node.rect.height,
                )
            } else {
                Rect::new(
                    node.rect.x,
                    node.rect.y,
                    node.rect.width,
                    config.containers.header_padding,
                )
            };
            return Some(band);
        }
        cursor = node.parent.as_ref();
        hops += 1;
        if hops > diagram.node_count() {
            return None;
        }
    }
    None
}

// ── Candidate generation ────────────────────────────────────────────

/// Cardinal candidates in the order this node kind prefers them.
fn cardinal_priority(kind: NodeKind) -> [LabelOrientation; 4] {
    use LabelOrientation::{Bottom, Left, Right, Top};
    match kind {
        // Markers read best with the text hanging under the symbol.
        NodeKind::Event | NodeKind::Boundary => [Bottom, Top, Right, Left],
        _ => [Top, Bottom, Right, Left],
    }
}

fn cardinal_rect(owner: &Rect, side: LabelOrientation, size: Size, clearance: f32) -> Rect {
    let center = owner.center();
    match side {
        LabelOrientation::Top => Rect::new(
            center.x - size.width / 2.0,
            owner.y - clearance - size.height,
            size.width,
            size.height,
        ),
        LabelOrientation::Bottom => Rect::new(
            center.x - size.width / 2.0,
            owner.bottom() + clearance,
            size.width,
            size.height,
        ),
        LabelOrientation::Left => Rect::new(
            owner.x - clearance - size.width,
            center.y - size.height / 2.0,
            size.width,
            size.height,
        ),
        LabelOrientation::Right => Rect::new(
            owner.right() + clearance,
            center.y - size.height / 2.0,
            size.width,
            size.height,
        ),
    }
}

/// Diagonal fallback spots off the owner's corners, sized by the default
/// label envelope rather than the measured text.
fn corner_rects(owner: &Rect, envelope: Size, clearance: f32) -> [Rect; 4] {
    let left = owner.x - clearance - envelope.width;
    let right = owner.right() + clearance;
    let top = owner.y - clearance - envelope.height;
    let bottom = owner.bottom() + clearance;
    [
        Rect::new(left, top, envelope.width, envelope.height),
        Rect::new(right, top, envelope.width, envelope.height),
        Rect::new(left, bottom, envelope.width, envelope.height),
        Rect::new(right, bottom, envelope.width, envelope.height),
    ]
}

/// Candidates beside the exact 50%-arclength midpoint of the edge, near
/// offsets first, both sides of the path at each distance.
fn edge_candidates(points: &[Point], size: Size, clearance: f32) -> Option<Vec<Rect>> {
    let (mid, dir) = point_at_fraction(points, 0.5)?;
    let normal = Point::new(-dir.y, dir.x);
    let half = if normal.y.abs() >= normal.x.abs() {
        size.height / 2.0
    } else {
        size.width / 2.0
    };
    let base = clearance + half;
    let mut out = Vec::with_capacity(EDGE_OFFSET_STEPS.len() * 2);
    for step in EDGE_OFFSET_STEPS {
        for sign in [1.0, -1.0] {
            let d = base * step * sign;
            let center = Point::new(mid.x + normal.x * d, mid.y + normal.y * d);
            out.push(Rect::from_center(center, size));
        }
    }
    Some(out)
}

/// Two short slides along the label's reading axis, used when the only
/// conflict is the owner's own connection.
fn nudge_rects(rect: &Rect, orientation: Option<LabelOrientation>, clearance: f32) -> [Rect; 2] {
    match orientation {
        Some(LabelOrientation::Left | LabelOrientation::Right) => [
            rect.translated(0.0, -clearance),
            rect.translated(0.0, clearance),
        ],
        _ => [
            rect.translated(-clearance, 0.0),
            rect.translated(clearance, 0.0),
        ],
    }
}

fn resolved_size(label: &Label, config: &EngineConfig) -> Size {
    if label.rect.width > 0.0 && label.rect.height > 0.0 {
        return label.rect.size();
    }
    if !label.text.is_empty() {
        return estimate_label_size(&label.text, config.font.size, &config.font.family);
    }
    Size::new(config.labels.default_width, config.labels.default_height)
}

// ── Placement ───────────────────────────────────────────────────────

/// Returns whether the label should visit the final centering pass, or
/// `None` when the owner or its label is gone.
fn place_node_label(
    diagram: &mut Diagram,
    id: &ElementId,
    direction: Direction,
    config: &EngineConfig,
    obstacles: &mut Obstacles,
) -> Option<bool> {
    let node = diagram.node(id)?;
    let label = node.label.as_ref()?;
    let kind = node.kind;
    let owner_rect = node.rect;
    let clearance = config.labels.clearance;
    let size = resolved_size(label, config);
    let priority = cardinal_priority(kind);
    let unplaced = label.rect.width <= 0.0 || label.rect.height <= 0.0;
    let (current, orientation) = if unplaced {
        let seed = cardinal_rect(&owner_rect, priority[0], size, clearance);
        (seed, Some(priority[0]))
    } else {
        let rect = Rect::new(label.rect.x, label.rect.y, size.width, size.height);
        (rect, label.orientation)
    };
    let zone = host_zone(diagram, node, direction, config);

    let owner = Owner::Node(id);
    let current_score = score_candidate(&current, owner, zone.as_ref(), obstacles, config);

    let (placed, placed_orientation, recenter) = if current_score.clean() {
        if orientation == Some(priority[0]) {
            (current, orientation, false)
        } else {
            // Clean but on a side this kind does not prefer. Switch only
            // when the preferred side is just as clean.
            let preferred = cardinal_rect(&owner_rect, priority[0], size, clearance);
            let score = score_candidate(&preferred, owner, zone.as_ref(), obstacles, config);
            if score.clean() {
                (preferred, Some(priority[0]), true)
            } else {
                (current, orientation, false)
            }
        }
    } else if current_score.self_cross_only() {
        let mut best = current;
        let mut best_total = current_score.total;
        for nudge in nudge_rects(&current, orientation, clearance) {
            let score = score_candidate(&nudge, owner, zone.as_ref(), obstacles, config);
            if score.total < best_total {
                best = nudge;
                best_total = score.total;
            }
        }
        let moved = best.x != current.x || best.y != current.y;
        (best, orientation, moved)
    } else {
        let mut best = current;
        let mut best_total = current_score.total;
        let mut best_orientation = orientation;
        for side in priority {
            let candidate = cardinal_rect(&owner_rect, side, size, clearance);
            let score = score_candidate(&candidate, owner, zone.as_ref(), obstacles, config);
            if score.total < best_total {
                best = candidate;
                best_total = score.total;
                best_orientation = Some(side);
            }
        }
        let envelope = Size::new(config.labels.default_width, config.labels.default_height);
        for candidate in corner_rects(&owner_rect, envelope, clearance) {
            let score = score_candidate(&candidate, owner, zone.as_ref(), obstacles, config);
            if score.total < best_total {
                best = candidate;
                best_total = score.total;
                best_orientation = None;
            }
        }
        (best, best_orientation, true)
    };

    let node = diagram.node_mut(id)?;
    let label = node.label.as_mut()?;
    label.rect = placed;
    label.orientation = placed_orientation;
    obstacles.labels.insert(id.clone(), placed);
    Some(recenter)
}

fn place_edge_label(
    diagram: &mut Diagram,
    id: &ElementId,
    config: &EngineConfig,
    obstacles: &mut Obstacles,
) -> Option<()> {
    let edge = diagram.edge(id)?;
    let label = edge.label.as_ref()?;
    let clearance = config.labels.clearance;
    let size = resolved_size(label, config);
    let points = edge.waypoints.clone();
    let candidates = edge_candidates(&points, size, clearance)?;
    let unplaced = label.rect.width <= 0.0 || label.rect.height <= 0.0;
    let current = if unplaced {
        candidates[0]
    } else {
        Rect::new(label.rect.x, label.rect.y, size.width, size.height)
    };

    let owner = Owner::Edge(id);
    let current_score = score_candidate(&current, owner, None, obstacles, config);
    let mut best = current;
    let mut best_total = current_score.total;
    if !current_score.clean() {
        if current_score.self_cross_only() {
            for nudge in nudge_rects(&current, None, clearance) {
                let score = score_candidate(&nudge, owner, None, obstacles, config);
                if score.total < best_total {
                    best = nudge;
                    best_total = score.total;
                }
            }
        } else {
            for candidate in &candidates {
                let score = score_candidate(candidate, owner, None, obstacles, config);
                if score.total < best_total {
                    best = *candidate;
                    best_total = score.total;
                }
            }
        }
    }

    let edge = diagram.edge_mut(id)?;
    let label = edge.label.as_mut()?;
    label.rect = best;
    obstacles.labels.insert(id.clone(), best);
    Some(())
}

/// Lines the horizontal center of top/bottom labels back up with their
/// owner, unless doing so would score worse than where the label settled.
/// Boundary labels keep whatever offset placement gave them.
fn recenter_pass(
    diagram: &mut Diagram,
    ids: &[ElementId],
    direction: Direction,
    config: &EngineConfig,
    obstacles: &mut Obstacles,
) {
    for id in ids {
        let Some(node) = diagram.node(id) else {
            continue;
        };
        if node.kind == NodeKind::Boundary {
            continue;
        }
        let Some(label) = node.label.as_ref() else {
            continue;
        };
        if !matches!(
            label.orientation,
            Some(LabelOrientation::Top | LabelOrientation::Bottom)
        ) {
            continue;
        }
        let centered_x = node.rect.center().x - label.rect.width / 2.0;
        if (centered_x - label.rect.x).abs() <= RECENTER_SLACK {
            continue;
        }
        let candidate = Rect::new(centered_x, label.rect.y, label.rect.width, label.rect.height);
        let owner = Owner::Node(id);
        let zone = host_zone(diagram, node, direction, config);
        let settled = score_candidate(&label.rect, owner, zone.as_ref(), obstacles, config);
        let centered = score_candidate(&candidate, owner, zone.as_ref(), obstacles, config);
        if centered.total > settled.total {
            continue;
        }
        let Some(node) = diagram.node_mut(id) else {
            continue;
        };
        let Some(label) = node.label.as_mut() else {
            continue;
        };
        label.rect = candidate;
        obstacles.labels.insert(id.clone(), candidate);
    }
}
