use tracing::debug;

use crate::config::EngineConfig;
use crate::geometry::{Rect, bounding_rect};
use crate::model::{Diagram, Direction, ElementId, NodeKind};

use super::graph::ScopePlan;
use super::types::PoolExpansion;

/// Rect deltas below this are treated as already applied, so re-running the
/// pass on a fitted container writes nothing.
const SIZE_EPSILON: f32 = 0.01;

/// Fits every scoped container around its content, innermost first so a
/// nested subprocess settles before its parent measures it. Containers and
/// lanes the pass cannot resize are reported back as issue strings.
pub(crate) fn autosize_containers(
    diagram: &mut Diagram,
    plan: &ScopePlan,
    direction: Direction,
    config: &EngineConfig,
    expansion: Option<&PoolExpansion>,
) -> Vec<String> {
    let mut issues = Vec::new();
    for id in &plan.autosize {
        fit_container(diagram, id, direction, config, expansion, &mut issues);
    }
    if !issues.is_empty() {
        debug!(count = issues.len(), "container sizing issues recorded");
    }
    issues
}

fn fit_container(
    diagram: &mut Diagram,
    id: &ElementId,
    direction: Direction,
    config: &EngineConfig,
    expansion: Option<&PoolExpansion>,
    issues: &mut Vec<String>,
) {
    let Some(node) = diagram.node(id) else {
        issues.push(format!("container `{id}` no longer exists"));
        return;
    };
    let kind = node.kind;
    let current = node.rect;
    let info = node.container.clone().unwrap_or_default();
    let padding = expansion
        .and_then(|e| e.padding)
        .unwrap_or(config.containers.padding);
    let header = config.containers.header_padding;

    // Lane rects are outputs of this pass, so content is measured from lane
    // children rather than the stale lane boxes themselves.
    let mut lanes: Vec<(ElementId, Option<Rect>)> = Vec::new();
    for lane_id in &info.lanes {
        match diagram.node(lane_id) {
            Some(lane) if lane.kind == NodeKind::Lane => {
                let content = bounding_rect(diagram.children_of(lane_id).map(|n| &n.rect));
                lanes.push((lane_id.clone(), content));
            }
            _ => issues.push(format!("lane `{lane_id}` of `{id}` cannot be resized")),
        }
    }

    let mut content: Vec<Rect> = diagram
        .children_of(id)
        .filter(|n| n.kind != NodeKind::Lane)
        .map(|n| n.rect)
        .collect();
    content.extend(lanes.iter().filter_map(|(_, c)| *c));
    let Some(bounds) = bounding_rect(content.iter()) else {
        // Nothing inside, leave the container as authored.
        return;
    };

    // Grow-only box: edges move outwards to cover the content, never in.
    // The side carrying the title band gets the extra header allowance.
    let (left, top) = if direction.is_horizontal() {
        (
            current.x.min(bounds.x - padding - header),
            current.y.min(bounds.y - padding),
        )
    } else {
        (
            current.x.min(bounds.x - padding),
            current.y.min(bounds.y - padding - header),
        )
    };
    let right = current.right().max(bounds.right() + padding);
    let bottom = current.bottom().max(bounds.bottom() + padding);
    let mut width = right - left;
    let mut height = bottom - top;

    if let Some(min) = info.min_size {
        width = width.max(min.width);
        height = height.max(min.height);
    }

    if kind == NodeKind::Pool
        && let Some(target) = expansion.and_then(|e| e.aspect_ratio)
    {
        let target = target.clamp(config.containers.min_aspect, config.containers.max_aspect);
        let ratio = width / height;
        if ratio < target {
            width = height * target;
        } else if ratio > target {
            height = width / target;
        }
    }

    // Each lane claims its content span plus padding, floored at the
    // configured minimum; the container stretches to hold the sum.
    let needs: Vec<f32> = lanes
        .iter()
        .map(|(_, content)| {
            let span = content.map_or(0.0, |c| {
                if direction.is_horizontal() {
                    c.height
                } else {
                    c.width
                }
            });
            (span + padding * 2.0).max(config.containers.lane_min_height)
        })
        .collect();
    let total: f32 = needs.iter().sum();
    if !lanes.is_empty() {
        if direction.is_horizontal() {
            height = height.max(total);
        } else {
            width = width.max(total);
        }
    }

    write_rect(diagram, id, Rect::new(left, top, width, height));

    if lanes.is_empty() || total <= 0.0 {
        return;
    }

    // Distribute the final extent proportionally to need. The last lane
    // takes whatever is left so the spans sum exactly to the container.
    let scale = if direction.is_horizontal() {
        height / total
    } else {
        width / total
    };
    let mut cursor = if direction.is_horizontal() { top } else { left };
    let last = lanes.len() - 1;
    for (i, (lane_id, _)) in lanes.iter().enumerate() {
        let span = if i == last {
            if direction.is_horizontal() {
                top + height - cursor
            } else {
                left + width - cursor
            }
        } else {
            needs[i] * scale
        };
        let rect = if direction.is_horizontal() {
            Rect::new(left + header, cursor, width - header, span)
        } else {
            Rect::new(cursor, top + header, span, height - header)
        };
        write_rect(diagram, lane_id, rect);
        cursor += span;
    }
}

fn write_rect(diagram: &mut Diagram, id: &ElementId, rect: Rect) {
    if let Some(node) = diagram.node_mut(id)
        && !rects_close(&node.rect, &rect)
    {
        node.rect = rect;
    }
}

fn rects_close(a: &Rect, b: &Rect) -> bool {
    (a.x - b.x).abs() <= SIZE_EPSILON
        && (a.y - b.y).abs() <= SIZE_EPSILON
        && (a.width - b.width).abs() <= SIZE_EPSILON
        && (a.height - b.height).abs() <= SIZE_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::layout::graph::plan_scope;
    use crate::layout::types::Scope;
    use crate::model::{ContainerInfo, DiagramNode};
    use crate::session::PinSet;

    fn run(diagram: &mut Diagram, direction: Direction) -> Vec<String> {
        run_with(diagram, direction, None)
    }

    fn run_with(
        diagram: &mut Diagram,
        direction: Direction,
        expansion: Option<&PoolExpansion>,
    ) -> Vec<String> {
        let plan = plan_scope(diagram, &Scope::full(), &PinSet::new()).unwrap();
        autosize_containers(diagram, &plan, direction, &EngineConfig::default(), expansion)
    }

    fn three_lane_pool() -> Diagram {
        let mut d = Diagram::new();
        d.insert_node(
            DiagramNode::new("pool", NodeKind::Pool, Rect::new(0.0, 0.0, 500.0, 300.0))
                .with_container(ContainerInfo {
                    lanes: vec!["l1".into(), "l2".into(), "l3".into()],
                    min_size: None,
                }),
        );
        for (lane, y) in [("l1", 0.0), ("l2", 100.0), ("l3", 200.0)] {
            d.insert_node(
                DiagramNode::new(lane, NodeKind::Lane, Rect::new(30.0, y, 470.0, 100.0))
                    .with_parent("pool"),
            );
        }
        d.insert_node(
            DiagramNode::new("a", NodeKind::Task, Rect::new(60.0, 30.0, 80.0, 80.0))
                .with_parent("l1"),
        );
        d.insert_node(
            DiagramNode::new("b", NodeKind::Task, Rect::new(200.0, 120.0, 80.0, 150.0))
                .with_parent("l2"),
        );
        d.insert_node(
            DiagramNode::new("c", NodeKind::Task, Rect::new(350.0, 280.0, 80.0, 60.0))
                .with_parent("l3"),
        );
        d
    }

    #[test]
    fn lane_heights_follow_content_need_and_sum_to_the_pool() {
        let mut d = three_lane_pool();
        let issues = run(&mut d, Direction::LeftRight);
        assert!(issues.is_empty());

        let pool = d.node(&"pool".into()).unwrap().rect;
        let l1 = d.node(&"l1".into()).unwrap().rect;
        let l2 = d.node(&"l2".into()).unwrap().rect;
        let l3 = d.node(&"l3".into()).unwrap().rect;

        // Needs are content height plus padding on both sides: 120/190/100.
        assert_eq!(l1.height, 120.0);
        assert_eq!(l2.height, 190.0);
        assert_eq!(l3.height, 100.0);
        assert_eq!(pool.height, 410.0);
        assert_eq!(l1.height + l2.height + l3.height, pool.height);
        assert_eq!(l2.y, l1.bottom());
        assert_eq!(l3.bottom(), pool.bottom());
        // Lanes start past the pool's title band.
        assert_eq!(l1.x, pool.x + 30.0);
        assert_eq!(l1.width, pool.width - 30.0);
    }

    #[test]
    fn second_pass_changes_nothing() {
        let mut d = three_lane_pool();
        run(&mut d, Direction::LeftRight);
        let after_first: Vec<Rect> = ["pool", "l1", "l2", "l3", "a", "b", "c"]
            .iter()
            .map(|id| d.node(&(*id).into()).unwrap().rect)
            .collect();

        let issues = run(&mut d, Direction::LeftRight);
        assert!(issues.is_empty());
        let after_second: Vec<Rect> = ["pool", "l1", "l2", "l3", "a", "b", "c"]
            .iter()
            .map(|id| d.node(&(*id).into()).unwrap().rect)
            .collect();
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn fitted_container_is_left_untouched() {
        let mut d = Diagram::new();
        d.insert_node(DiagramNode::new(
            "sub",
            NodeKind::Subprocess,
            Rect::new(0.0, 0.0, 400.0, 300.0),
        ));
        d.insert_node(
            DiagramNode::new("t", NodeKind::Task, Rect::new(60.0, 30.0, 80.0, 40.0))
                .with_parent("sub"),
        );
        let issues = run(&mut d, Direction::LeftRight);
        assert!(issues.is_empty());
        assert_eq!(
            d.node(&"sub".into()).unwrap().rect,
            Rect::new(0.0, 0.0, 400.0, 300.0)
        );
    }

    #[test]
    fn container_grows_but_never_shrinks() {
        let mut d = Diagram::new();
        d.insert_node(DiagramNode::new(
            "sub",
            NodeKind::Subprocess,
            Rect::new(0.0, 0.0, 100.0, 80.0),
        ));
        d.insert_node(
            DiagramNode::new("t", NodeKind::Task, Rect::new(60.0, 30.0, 120.0, 40.0))
                .with_parent("sub"),
        );
        run(&mut d, Direction::LeftRight);
        let rect = d.node(&"sub".into()).unwrap().rect;
        // Right edge follows the content, the other edges stay.
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 0.0);
        assert_eq!(rect.right(), 200.0);
        assert_eq!(rect.bottom(), 90.0);
    }

    #[test]
    fn minimum_size_is_honored() {
        let mut d = Diagram::new();
        d.insert_node(
            DiagramNode::new("sub", NodeKind::Subprocess, Rect::new(0.0, 0.0, 100.0, 80.0))
                .with_container(ContainerInfo {
                    lanes: Vec::new(),
                    min_size: Some(Size::new(300.0, 200.0)),
                }),
        );
        d.insert_node(
            DiagramNode::new("t", NodeKind::Task, Rect::new(60.0, 30.0, 40.0, 20.0))
                .with_parent("sub"),
        );
        run(&mut d, Direction::LeftRight);
        let rect = d.node(&"sub".into()).unwrap().rect;
        assert_eq!(rect.width, 300.0);
        assert_eq!(rect.height, 200.0);
    }

    #[test]
    fn aspect_ratio_grows_the_short_dimension() {
        let mut d = Diagram::new();
        d.insert_node(DiagramNode::new(
            "pool",
            NodeKind::Pool,
            Rect::new(0.0, 0.0, 200.0, 200.0),
        ));
        d.insert_node(
            DiagramNode::new("a", NodeKind::Task, Rect::new(60.0, 40.0, 100.0, 100.0))
                .with_parent("pool"),
        );
        let expansion = PoolExpansion {
            aspect_ratio: Some(3.0),
            padding: None,
        };
        let issues = run_with(&mut d, Direction::LeftRight, Some(&expansion));
        assert!(issues.is_empty());
        let rect = d.node(&"pool".into()).unwrap().rect;
        assert_eq!(rect.width, 600.0);
        assert_eq!(rect.height, 200.0);
    }

    #[test]
    fn aspect_ratio_is_clamped_to_the_band() {
        let mut d = Diagram::new();
        d.insert_node(DiagramNode::new(
            "pool",
            NodeKind::Pool,
            Rect::new(0.0, 0.0, 200.0, 200.0),
        ));
        d.insert_node(
            DiagramNode::new("a", NodeKind::Task, Rect::new(60.0, 40.0, 100.0, 100.0))
                .with_parent("pool"),
        );
        let expansion = PoolExpansion {
            aspect_ratio: Some(10.0),
            padding: None,
        };
        run_with(&mut d, Direction::LeftRight, Some(&expansion));
        let rect = d.node(&"pool".into()).unwrap().rect;
        assert_eq!(rect.width, 1000.0, "band tops out at 5:1");
    }

    #[test]
    fn missing_lane_is_reported_and_skipped() {
        let mut d = Diagram::new();
        d.insert_node(
            DiagramNode::new("pool", NodeKind::Pool, Rect::new(0.0, 0.0, 500.0, 200.0))
                .with_container(ContainerInfo {
                    lanes: vec!["l1".into(), "ghost".into()],
                    min_size: None,
                }),
        );
        d.insert_node(
            DiagramNode::new("l1", NodeKind::Lane, Rect::new(30.0, 0.0, 470.0, 200.0))
                .with_parent("pool"),
        );
        d.insert_node(
            DiagramNode::new("a", NodeKind::Task, Rect::new(60.0, 30.0, 80.0, 80.0))
                .with_parent("l1"),
        );
        let issues = run(&mut d, Direction::LeftRight);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("ghost"));
        // The surviving lane still gets the full pool height.
        assert_eq!(
            d.node(&"l1".into()).unwrap().rect,
            Rect::new(30.0, 0.0, 470.0, 200.0)
        );
    }

    #[test]
    fn vertical_direction_stacks_lanes_sideways() {
        let mut d = Diagram::new();
        d.insert_node(
            DiagramNode::new("pool", NodeKind::Pool, Rect::new(0.0, 0.0, 300.0, 400.0))
                .with_container(ContainerInfo {
                    lanes: vec!["l1".into(), "l2".into()],
                    min_size: None,
                }),
        );
        d.insert_node(
            DiagramNode::new("l1", NodeKind::Lane, Rect::new(0.0, 30.0, 150.0, 370.0))
                .with_parent("pool"),
        );
        d.insert_node(
            DiagramNode::new("l2", NodeKind::Lane, Rect::new(150.0, 30.0, 150.0, 370.0))
                .with_parent("pool"),
        );
        d.insert_node(
            DiagramNode::new("a", NodeKind::Task, Rect::new(30.0, 60.0, 100.0, 80.0))
                .with_parent("l1"),
        );
        d.insert_node(
            DiagramNode::new("b", NodeKind::Task, Rect::new(160.0, 60.0, 60.0, 80.0))
                .with_parent("l2"),
        );
        run(&mut d, Direction::TopDown);

        let pool = d.node(&"pool".into()).unwrap().rect;
        let l1 = d.node(&"l1".into()).unwrap().rect;
        let l2 = d.node(&"l2".into()).unwrap().rect;
        assert_eq!(pool, Rect::new(0.0, 0.0, 300.0, 400.0));
        // Needs 140/100 scaled into a 300 wide pool: 175 plus the remainder.
        assert_eq!(l1.width, 175.0);
        assert_eq!(l2.x, 175.0);
        assert_eq!(l2.width, 125.0);
        assert_eq!(l1.y, 30.0, "lanes start under the title band");
        assert_eq!(l1.width + l2.width, pool.width);
    }
}
