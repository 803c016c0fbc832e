use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::model::{Diagram, Direction, ElementId, NodeKind};

use super::graph::ScopePlan;

/// Walks the primary route through the flow: start at a node without
/// incoming flows, follow the primary-flagged edge out of each branch,
/// declaration order breaking ties. With several disconnected starts the
/// longest path wins, ties going to the first declared start. Boundary
/// events and their exception routes never join the path.
pub(crate) fn find_happy_path(diagram: &Diagram) -> Vec<ElementId> {
    let eligible: HashSet<&ElementId> = diagram
        .nodes()
        .filter(|n| n.kind.participates_in_flow() && n.kind != NodeKind::Boundary)
        .map(|n| &n.id)
        .collect();

    let mut outgoing: HashMap<&ElementId, Vec<(&ElementId, bool)>> = HashMap::new();
    let mut has_incoming: HashSet<&ElementId> = HashSet::new();
    for edge in diagram.edges() {
        if !eligible.contains(&edge.source) || !eligible.contains(&edge.target) {
            continue;
        }
        outgoing
            .entry(&edge.source)
            .or_default()
            .push((&edge.target, edge.primary));
        has_incoming.insert(&edge.target);
    }

    let mut best: Vec<ElementId> = Vec::new();
    for node in diagram.nodes() {
        if !eligible.contains(&node.id) || has_incoming.contains(&node.id) {
            continue;
        }
        let path = walk_from(&node.id, &outgoing);
        if path.len() > best.len() {
            best = path;
        }
    }
    if !best.is_empty() {
        debug!(len = best.len(), start = %best[0], "happy path resolved");
    }
    best
}

fn walk_from(
    start: &ElementId,
    outgoing: &HashMap<&ElementId, Vec<(&ElementId, bool)>>,
) -> Vec<ElementId> {
    let mut path = vec![start.clone()];
    let mut visited: HashSet<&ElementId> = HashSet::new();
    visited.insert(start);
    let mut current = start;
    while let Some(candidates) = outgoing.get(current) {
        let next = candidates
            .iter()
            .find(|(target, primary)| *primary && !visited.contains(target))
            .or_else(|| candidates.iter().find(|(target, _)| !visited.contains(target)));
        let Some(&(target, _)) = next else {
            break;
        };
        visited.insert(target);
        path.push(target.clone());
        current = target;
    }
    path
}

/// Pulls every movable path node onto the first path node's row after the
/// solver has placed everything. Boundary followers of a shifted host take
/// the same minor-axis delta so they stay glued to the host border.
pub(crate) fn align_to_row(
    diagram: &mut Diagram,
    plan: &ScopePlan,
    path: &[ElementId],
    direction: Direction,
) {
    if path.len() < 2 {
        return;
    }
    let movable = plan.movable_set();
    let horizontal = direction.is_horizontal();
    let Some(reference) = path
        .iter()
        .filter_map(|id| diagram.node(id))
        .map(|n| {
            if horizontal {
                n.rect.center().y
            } else {
                n.rect.center().x
            }
        })
        .next()
    else {
        return;
    };

    let mut deltas: HashMap<ElementId, f32> = HashMap::new();
    for id in path {
        if !movable.contains(id) {
            continue;
        }
        let Some(node) = diagram.node_mut(id) else {
            continue;
        };
        let delta = if horizontal {
            let delta = reference - node.rect.center().y;
            node.rect.y += delta;
            delta
        } else {
            let delta = reference - node.rect.center().x;
            node.rect.x += delta;
            delta
        };
        if delta != 0.0 {
            deltas.insert(id.clone(), delta);
        }
    }

    for (follower, host) in &plan.followers {
        let Some(delta) = deltas.get(host).copied() else {
            continue;
        };
        if let Some(node) = diagram.node_mut(follower) {
            if horizontal {
                node.rect.y += delta;
            } else {
                node.rect.x += delta;
            }
        }
    }
}
