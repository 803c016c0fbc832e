use std::collections::HashSet;

use tracing::debug;

use crate::config::EngineConfig;
use crate::geometry::{Point, Rect, polyline_length, polylines_intersect};
use crate::model::{Diagram, Direction, ElementId};

use super::graph::ScopePlan;
use super::types::QualityMetrics;

// ── Route canonicalization ──────────────────────────────────────────
/// Segments shorter than this collapse when deduplicating waypoints.
const MIN_SEGMENT: f32 = 0.5;

// ── Quality metrics ─────────────────────────────────────────────────
/// Max off-axis drift for a segment to count as axis-parallel.
const ORTHO_TOLERANCE: f32 = 0.5;
/// Edge length of one density cell.
const DENSITY_CELL: f32 = 100.0;

/// Refreshes the routes of every edge the plan marked for rerouting.
/// Edges with a moved endpoint get a fresh orthogonal route; stale routes
/// between unmoved endpoints are only collapsed to canonical shape when
/// their endpoints sit nearly on one rank, and keep their bends otherwise.
pub(crate) fn route_edges(
    diagram: &mut Diagram,
    plan: &ScopePlan,
    direction: Direction,
    config: &EngineConfig,
) {
    let moved: HashSet<ElementId> = plan
        .movable
        .iter()
        .chain(plan.followers.keys())
        .cloned()
        .collect();
    let tolerance = config.routing.align_tolerance;

    for id in &plan.reroute {
        let Some(edge) = diagram.edge(id) else {
            continue;
        };
        let (Some(from), Some(to)) = (diagram.node(&edge.source), diagram.node(&edge.target))
        else {
            debug!(edge = %id, "skipping route for dangling edge");
            continue;
        };
        let from_rect = from.rect;
        let to_rect = to.rect;
        let endpoint_moved = moved.contains(&edge.source) || moved.contains(&edge.target);
        let current = edge.waypoints.clone();

        let route = if endpoint_moved || current.len() < 2 {
            default_route(&from_rect, &to_rect, direction, tolerance)
        } else if rank_aligned(&from_rect, &to_rect, direction, tolerance) {
            default_route(&from_rect, &to_rect, direction, tolerance)
        } else {
            dedupe_waypoints(&current)
        };
        if let Some(edge) = diagram.edge_mut(id) {
            edge.waypoints = route;
        }
    }
}

fn rank_aligned(from: &Rect, to: &Rect, direction: Direction, tolerance: f32) -> bool {
    if direction.is_horizontal() {
        (from.center().y - to.center().y).abs() <= tolerance
    } else {
        (from.center().x - to.center().x).abs() <= tolerance
    }
}

/// Canonical orthogonal route between two boxes: a straight line when the
/// endpoints share a rank, an L when they already touch on the major axis,
/// and a Z through the mid-channel between the ranks otherwise.
pub(crate) fn default_route(
    from: &Rect,
    to: &Rect,
    direction: Direction,
    tolerance: f32,
) -> Vec<Point> {
    let fc = from.center();
    let tc = to.center();
    if direction.is_horizontal() {
        let forward = tc.x >= fc.x;
        let (exit_x, entry_x) = if forward {
            (from.right(), to.x)
        } else {
            (from.x, to.right())
        };
        if (fc.y - tc.y).abs() <= tolerance {
            return vec![Point::new(exit_x, fc.y), Point::new(entry_x, fc.y)];
        }
        let gap = if forward {
            to.x - from.right()
        } else {
            from.x - to.right()
        };
        if gap <= 0.0 {
            // Boxes overlap on the major axis: drop out of the source and
            // come in at the target's side.
            let exit_y = if tc.y >= fc.y { from.bottom() } else { from.y };
            return vec![
                Point::new(fc.x, exit_y),
                Point::new(fc.x, tc.y),
                Point::new(entry_x, tc.y),
            ];
        }
        let channel_x = if forward {
            (from.right() + to.x) / 2.0
        } else {
            (to.right() + from.x) / 2.0
        };
        vec![
            Point::new(exit_x, fc.y),
            Point::new(channel_x, fc.y),
            Point::new(channel_x, tc.y),
            Point::new(entry_x, tc.y),
        ]
    } else {
        let forward = tc.y >= fc.y;
        let (exit_y, entry_y) = if forward {
            (from.bottom(), to.y)
        } else {
            (from.y, to.bottom())
        };
        if (fc.x - tc.x).abs() <= tolerance {
            return vec![Point::new(fc.x, exit_y), Point::new(fc.x, entry_y)];
        }
        let gap = if forward {
            to.y - from.bottom()
        } else {
            from.y - to.bottom()
        };
        if gap <= 0.0 {
            let exit_x = if tc.x >= fc.x { from.right() } else { from.x };
            return vec![
                Point::new(exit_x, fc.y),
                Point::new(tc.x, fc.y),
                Point::new(tc.x, entry_y),
            ];
        }
        let channel_y = if forward {
            (from.bottom() + to.y) / 2.0
        } else {
            (to.bottom() + from.y) / 2.0
        };
        vec![
            Point::new(fc.x, exit_y),
            Point::new(fc.x, channel_y),
            Point::new(tc.x, channel_y),
            Point::new(tc.x, entry_y),
        ]
    }
}

/// Removes duplicate and collinear interior points without changing the
/// rendered line.
pub(crate) fn dedupe_waypoints(waypoints: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(waypoints.len());
    for point in waypoints {
        if let Some(last) = out.last()
            && last.distance_to(*point) < MIN_SEGMENT
        {
            continue;
        }
        if out.len() >= 2 {
            let a = out[out.len() - 2];
            let b = out[out.len() - 1];
            let cross = (b.x - a.x) * (point.y - a.y) - (b.y - a.y) * (point.x - a.x);
            if cross.abs() < MIN_SEGMENT {
                out.pop();
            }
        }
        out.push(*point);
    }
    out
}

/// Counts pairs of routed flows whose polylines intersect. Flows sharing an
/// endpoint are expected to touch and are skipped. Advisory only; nothing
/// is corrected here.
pub(crate) fn analyze_crossings(diagram: &Diagram) -> (usize, Vec<(ElementId, ElementId)>) {
    let routed: Vec<_> = diagram
        .edges()
        .filter(|e| e.waypoints.len() >= 2)
        .collect();
    let mut pairs: Vec<(ElementId, ElementId)> = Vec::new();
    for (i, first) in routed.iter().enumerate() {
        for second in routed.iter().skip(i + 1) {
            let shares_endpoint = first.source == second.source
                || first.source == second.target
                || first.target == second.source
                || first.target == second.target;
            if shares_endpoint {
                continue;
            }
            if polylines_intersect(&first.waypoints, &second.waypoints) {
                pairs.push((first.id.clone(), second.id.clone()));
            }
        }
    }
    (pairs.len(), pairs)
}

/// Summary statistics over the final geometry, reported with committed
/// passes so hosts can judge layout health without rendering.
pub(crate) fn quality_metrics(diagram: &Diagram) -> QualityMetrics {
    let mut total_length = 0.0f32;
    let mut routed = 0usize;
    let mut orthogonal = 0usize;
    for edge in diagram.edges() {
        if edge.waypoints.len() < 2 {
            continue;
        }
        routed += 1;
        total_length += polyline_length(&edge.waypoints);
        let axis_parallel = edge.waypoints.windows(2).all(|pair| {
            (pair[1].x - pair[0].x).abs() <= ORTHO_TOLERANCE
                || (pair[1].y - pair[0].y).abs() <= ORTHO_TOLERANCE
        });
        if axis_parallel {
            orthogonal += 1;
        }
    }

    let avg_flow_length = if routed > 0 {
        total_length / routed as f32
    } else {
        0.0
    };
    let orthogonal_flow_percent = if routed > 0 {
        orthogonal as f32 / routed as f32 * 100.0
    } else {
        0.0
    };

    let mut bounds: Option<Rect> = None;
    let mut elements = 0usize;
    for node in diagram.nodes() {
        elements += 1;
        bounds = Some(match bounds {
            Some(b) => b.union(&node.rect),
            None => node.rect,
        });
    }
    let element_density = match bounds {
        Some(b) if b.width > 0.0 && b.height > 0.0 => {
            let cells = (b.width / DENSITY_CELL) * (b.height / DENSITY_CELL);
            elements as f32 / cells.max(1.0)
        }
        _ => 0.0,
    };

    QualityMetrics {
        avg_flow_length,
        orthogonal_flow_percent,
        element_density,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::graph::plan_scope;
    use crate::layout::types::Scope;
    use crate::model::{DiagramEdge, DiagramNode, NodeKind};
    use crate::session::PinSet;

    fn task(id: &str, x: f32, y: f32) -> DiagramNode {
        DiagramNode::new(id, NodeKind::Task, Rect::new(x, y, 80.0, 40.0))
    }

    #[test]
    fn aligned_endpoints_get_a_straight_route() {
        let from = Rect::new(0.0, 100.0, 80.0, 40.0);
        let to = Rect::new(200.0, 102.0, 80.0, 40.0);
        let route = default_route(&from, &to, Direction::LeftRight, 8.0);
        assert_eq!(route.len(), 2);
        assert_eq!(route[0], Point::new(80.0, 120.0));
        assert_eq!(route[1].x, 200.0);
        assert_eq!(route[0].y, route[1].y);
    }

    #[test]
    fn offset_endpoints_get_a_z_through_the_channel() {
        let from = Rect::new(0.0, 0.0, 80.0, 40.0);
        let to = Rect::new(200.0, 160.0, 80.0, 40.0);
        let route = default_route(&from, &to, Direction::LeftRight, 8.0);
        assert_eq!(route.len(), 4);
        assert_eq!(route[1].x, 140.0, "channel sits midway between the ranks");
        assert_eq!(route[1].x, route[2].x);
        for pair in route.windows(2) {
            assert!(
                pair[0].x == pair[1].x || pair[0].y == pair[1].y,
                "every segment must be orthogonal"
            );
        }
    }

    #[test]
    fn overlapping_ranks_get_an_l_route() {
        let from = Rect::new(0.0, 0.0, 80.0, 40.0);
        let to = Rect::new(60.0, 160.0, 80.0, 40.0);
        let route = default_route(&from, &to, Direction::LeftRight, 8.0);
        assert_eq!(route.len(), 3);
        assert_eq!(route[0], Point::new(40.0, 40.0), "exits through the bottom");
        assert_eq!(route[2], Point::new(60.0, 180.0), "enters at the left side");
    }

    #[test]
    fn vertical_direction_swaps_axes() {
        let from = Rect::new(100.0, 0.0, 80.0, 40.0);
        let to = Rect::new(102.0, 200.0, 80.0, 40.0);
        let route = default_route(&from, &to, Direction::TopDown, 8.0);
        assert_eq!(route.len(), 2);
        assert_eq!(route[0].x, route[1].x);
        assert_eq!(route[0].y, 40.0);
    }

    #[test]
    fn dedupe_drops_collinear_interior_points() {
        let route = vec![
            Point::new(0.0, 0.0),
            Point::new(50.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 0.1),
            Point::new(100.0, 80.0),
        ];
        let cleaned = dedupe_waypoints(&route);
        assert_eq!(
            cleaned,
            vec![
                Point::new(0.0, 0.0),
                Point::new(100.0, 0.0),
                Point::new(100.0, 80.0),
            ]
        );
    }

    #[test]
    fn moved_endpoints_force_fresh_routes() {
        let mut d = Diagram::new();
        d.insert_node(task("a", 0.0, 0.0));
        d.insert_node(task("b", 200.0, 0.0));
        d.insert_edge(DiagramEdge::new("f", "a", "b").with_waypoints(vec![
            Point::new(80.0, 20.0),
            Point::new(120.0, 300.0),
            Point::new(200.0, 20.0),
        ]));
        let plan = plan_scope(&d, &Scope::full(), &PinSet::new()).unwrap();
        route_edges(
            &mut d,
            &plan,
            Direction::LeftRight,
            &EngineConfig::default(),
        );
        let edge = d.edge(&"f".into()).unwrap();
        assert_eq!(edge.waypoints.len(), 2, "stale detour replaced");
        assert_eq!(edge.waypoints[0], Point::new(80.0, 20.0));
        assert_eq!(edge.waypoints[1], Point::new(200.0, 20.0));
    }

    #[test]
    fn crossing_analysis_skips_shared_endpoints() {
        let mut d = Diagram::new();
        d.insert_node(task("a", 0.0, 0.0));
        d.insert_node(task("b", 200.0, 200.0));
        d.insert_node(task("c", 0.0, 200.0));
        d.insert_node(task("d", 200.0, 0.0));
        d.insert_edge(DiagramEdge::new("f1", "a", "b").with_waypoints(vec![
            Point::new(40.0, 20.0),
            Point::new(240.0, 220.0),
        ]));
        d.insert_edge(DiagramEdge::new("f2", "c", "d").with_waypoints(vec![
            Point::new(40.0, 220.0),
            Point::new(240.0, 20.0),
        ]));
        d.insert_edge(DiagramEdge::new("f3", "a", "d").with_waypoints(vec![
            Point::new(40.0, 20.0),
            Point::new(240.0, 20.0),
        ]));
        let (count, pairs) = analyze_crossings(&d);
        assert_eq!(count, 1, "only the X pair counts");
        assert_eq!(pairs, vec![("f1".into(), "f2".into())]);
    }

    #[test]
    fn quality_metrics_report_orthogonality_share() {
        let mut d = Diagram::new();
        d.insert_node(task("a", 0.0, 0.0));
        d.insert_node(task("b", 200.0, 0.0));
        d.insert_edge(DiagramEdge::new("f1", "a", "b").with_waypoints(vec![
            Point::new(80.0, 20.0),
            Point::new(200.0, 20.0),
        ]));
        d.insert_edge(DiagramEdge::new("f2", "b", "a").with_waypoints(vec![
            Point::new(200.0, 30.0),
            Point::new(80.0, 90.0),
        ]));
        let metrics = quality_metrics(&d);
        assert_eq!(metrics.orthogonal_flow_percent, 50.0);
        assert!(metrics.avg_flow_length > 0.0);
        assert!(metrics.element_density > 0.0);
    }
}
