use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::config::EngineConfig;
use crate::geometry::Point;
use crate::model::{Diagram, Direction, ElementId, NodeKind};

use super::graph::ScopePlan;
use super::types::LayoutRequest;

/// Shapes the closed-form placer can lay out without the solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Pattern {
    /// A single linear sequence covering every node.
    Chain(Vec<ElementId>),
    /// Optional linear head, one split, single-node branches reconverging
    /// into one merge, optional linear tail.
    SplitMerge {
        head: Vec<ElementId>,
        split: ElementId,
        branches: Vec<ElementId>,
        merge: ElementId,
        tail: Vec<ElementId>,
    },
}

/// Closed-form placement for trivially shaped graphs. Returns `None` when
/// the scope does not qualify, in which case the caller falls through to
/// the solver.
pub(crate) fn try_layout(
    diagram: &Diagram,
    plan: &ScopePlan,
    request: &LayoutRequest,
    config: &EngineConfig,
) -> Option<BTreeMap<ElementId, Point>> {
    if !plan.fixed.is_empty() || plan.movable.len() < 2 {
        return None;
    }
    // Lane bands constrain the minor axis; the closed-form rows ignore
    // them, so laned content always goes to the solver.
    for id in &plan.movable {
        if sits_in_lane(diagram, id) {
            return None;
        }
    }

    let movable = plan.movable_set();
    let mut pairs: BTreeSet<(ElementId, ElementId)> = BTreeSet::new();
    for edge in diagram.edges() {
        let source = plan.followers.get(&edge.source).unwrap_or(&edge.source);
        let target = plan.followers.get(&edge.target).unwrap_or(&edge.target);
        if source == target || !movable.contains(source) || !movable.contains(target) {
            continue;
        }
        pairs.insert((source.clone(), target.clone()));
    }

    let pattern = match_pattern(&plan.movable, &pairs, config.deterministic.max_branches)?;
    debug!(?pattern, "deterministic pattern matched");

    let primary = match &pattern {
        Pattern::SplitMerge {
            split, branches, ..
        } if request.preserve_happy_path => Some(primary_branch(diagram, split, branches)),
        _ => None,
    };
    Some(place(
        &pattern,
        diagram,
        request.direction,
        config,
        primary.as_ref(),
    ))
}

fn sits_in_lane(diagram: &Diagram, id: &ElementId) -> bool {
    let mut current = diagram.node(id).and_then(|n| n.parent.as_ref());
    let mut hops = 0usize;
    while let Some(parent) = current {
        if diagram
            .node(parent)
            .is_some_and(|p| p.kind == NodeKind::Lane)
        {
            return true;
        }
        hops += 1;
        if hops > diagram.node_count() {
            break;
        }
        current = diagram.node(parent).and_then(|n| n.parent.as_ref());
    }
    false
}

/// First primary-flagged branch out of the split, declaration order
/// breaking ties; without flags the first declared branch is the default.
fn primary_branch(diagram: &Diagram, split: &ElementId, branches: &[ElementId]) -> ElementId {
    for edge in diagram.edges() {
        if edge.primary && &edge.source == split && branches.contains(&edge.target) {
            return edge.target.clone();
        }
    }
    for edge in diagram.edges() {
        if &edge.source == split && branches.contains(&edge.target) {
            return edge.target.clone();
        }
    }
    branches[0].clone()
}

pub(crate) fn match_pattern(
    nodes: &[ElementId],
    pairs: &BTreeSet<(ElementId, ElementId)>,
    max_branches: usize,
) -> Option<Pattern> {
    if nodes.is_empty() {
        return None;
    }
    let mut outgoing: HashMap<&ElementId, Vec<&ElementId>> = HashMap::new();
    let mut incoming: HashMap<&ElementId, Vec<&ElementId>> = HashMap::new();
    for (source, target) in pairs {
        outgoing.entry(source).or_default().push(target);
        incoming.entry(target).or_default().push(source);
    }

    let splits: Vec<&ElementId> = nodes
        .iter()
        .filter(|id| outgoing.get(*id).map_or(0, |v| v.len()) > 1)
        .collect();
    match splits.len() {
        0 => match_chain(nodes, &outgoing, &incoming),
        1 => match_split_merge(nodes, splits[0], &outgoing, &incoming, max_branches),
        _ => None,
    }
}

fn match_chain(
    nodes: &[ElementId],
    outgoing: &HashMap<&ElementId, Vec<&ElementId>>,
    incoming: &HashMap<&ElementId, Vec<&ElementId>>,
) -> Option<Pattern> {
    let starts: Vec<&ElementId> = nodes
        .iter()
        .filter(|id| !incoming.contains_key(*id))
        .collect();
    if starts.len() != 1 {
        return None;
    }
    let mut order: Vec<ElementId> = Vec::with_capacity(nodes.len());
    let mut visited: HashSet<&ElementId> = HashSet::new();
    let mut current = starts[0];
    loop {
        if !visited.insert(current) {
            return None;
        }
        order.push(current.clone());
        match outgoing.get(current).map(|v| v.as_slice()) {
            None | Some([]) => break,
            Some([next]) => {
                if incoming.get(*next).map_or(0, |v| v.len()) != 1 {
                    return None;
                }
                current = *next;
            }
            Some(_) => return None,
        }
    }
    (order.len() == nodes.len()).then_some(Pattern::Chain(order))
}

fn match_split_merge(
    nodes: &[ElementId],
    split: &ElementId,
    outgoing: &HashMap<&ElementId, Vec<&ElementId>>,
    incoming: &HashMap<&ElementId, Vec<&ElementId>>,
    max_branches: usize,
) -> Option<Pattern> {
    let out_deg = |id: &ElementId| outgoing.get(id).map_or(0, |v| v.len());
    let in_deg = |id: &ElementId| incoming.get(id).map_or(0, |v| v.len());

    let raw_branches = outgoing.get(split)?;
    if raw_branches.len() > max_branches {
        return None;
    }

    // Branch stacking follows declaration order, not edge id order.
    let declared: HashMap<&ElementId, usize> =
        nodes.iter().enumerate().map(|(i, id)| (id, i)).collect();
    let mut branches: Vec<&ElementId> = raw_branches.to_vec();
    branches.sort_by_key(|b| declared.get(*b).copied().unwrap_or(usize::MAX));

    let mut merge: Option<&ElementId> = None;
    for &branch in &branches {
        if branch == split || in_deg(branch) != 1 || out_deg(branch) != 1 {
            return None;
        }
        let next = outgoing.get(branch).and_then(|v| v.first().copied())?;
        match merge {
            None => merge = Some(next),
            Some(m) if m == next => {}
            Some(_) => return None,
        }
    }
    let merge = merge?;
    if merge == split || branches.contains(&merge) || in_deg(merge) != branches.len() {
        return None;
    }

    let mut used: HashSet<&ElementId> = branches.iter().copied().collect();
    used.insert(split);
    used.insert(merge);
    if used.len() != branches.len() + 2 {
        return None;
    }

    // Linear head walking backwards from the split.
    let mut head: Vec<ElementId> = Vec::new();
    let mut current = split;
    while in_deg(current) == 1 {
        let prev = incoming.get(current).and_then(|v| v.first().copied())?;
        if out_deg(prev) != 1 || !used.insert(prev) {
            return None;
        }
        head.push(prev.clone());
        current = prev;
    }
    if in_deg(current) != 0 {
        return None;
    }
    head.reverse();

    // Linear tail walking forwards from the merge.
    let mut tail: Vec<ElementId> = Vec::new();
    let mut current = merge;
    while out_deg(current) == 1 {
        let next = outgoing.get(current).and_then(|v| v.first().copied())?;
        if in_deg(next) != 1 || !used.insert(next) {
            return None;
        }
        tail.push(next.clone());
        current = next;
    }

    let covered = head.len() + branches.len() + tail.len() + 2;
    (covered == nodes.len()).then(|| Pattern::SplitMerge {
        head,
        split: split.clone(),
        branches: branches.into_iter().cloned().collect(),
        merge: merge.clone(),
        tail,
    })
}

/// Closed-form coordinates: one rank per step along the major axis with
/// fixed spacing, branch rank spread on the minor axis. With a primary
/// branch the primary keeps the chain's row and the rest stack after it;
/// otherwise branches center symmetrically around the row.
fn place(
    pattern: &Pattern,
    diagram: &Diagram,
    direction: Direction,
    config: &EngineConfig,
    primary: Option<&ElementId>,
) -> BTreeMap<ElementId, Point> {
    let horizontal = direction.is_horizontal();
    let major_extent = |id: &ElementId| -> f32 {
        diagram
            .node(id)
            .map(|n| if horizontal { n.rect.width } else { n.rect.height })
            .unwrap_or(0.0)
    };
    let minor_extent = |id: &ElementId| -> f32 {
        diagram
            .node(id)
            .map(|n| if horizontal { n.rect.height } else { n.rect.width })
            .unwrap_or(0.0)
    };

    let ranks: Vec<Vec<&ElementId>> = match pattern {
        Pattern::Chain(order) => order.iter().map(|id| vec![id]).collect(),
        Pattern::SplitMerge {
            head,
            split,
            branches,
            merge,
            tail,
        } => {
            let mut ranks: Vec<Vec<&ElementId>> = Vec::new();
            ranks.extend(head.iter().map(|id| vec![id]));
            ranks.push(vec![split]);
            ranks.push(branches.iter().collect());
            ranks.push(vec![merge]);
            ranks.extend(tail.iter().map(|id| vec![id]));
            ranks
        }
    };

    let mut centers: BTreeMap<ElementId, Point> = BTreeMap::new();
    let mut cursor = config.spacing.margin;
    for rank in &ranks {
        let rank_extent = rank
            .iter()
            .map(|id| major_extent(id))
            .fold(0.0f32, f32::max);
        let major_center = cursor + rank_extent / 2.0;
        cursor += rank_extent + config.spacing.layer_spacing;

        let minor_centers: Vec<(ElementId, f32)> = if rank.len() == 1 {
            vec![((*rank[0]).clone(), 0.0)]
        } else if let Some(primary) = primary.filter(|p| rank.iter().any(|id| *id == *p)) {
            let mut out = vec![(primary.clone(), 0.0)];
            let mut bottom = minor_extent(primary) / 2.0;
            for id in rank.iter().filter(|id| **id != primary) {
                let extent = minor_extent(id);
                let center = bottom + config.spacing.node_spacing + extent / 2.0;
                out.push(((*id).clone(), center));
                bottom = center + extent / 2.0;
            }
            out
        } else {
            let total: f32 = rank.iter().map(|id| minor_extent(id)).sum::<f32>()
                + config.spacing.node_spacing * (rank.len() - 1) as f32;
            let mut top = -total / 2.0;
            rank.iter()
                .map(|id| {
                    let extent = minor_extent(id);
                    let center = top + extent / 2.0;
                    top += extent + config.spacing.node_spacing;
                    ((*id).clone(), center)
                })
                .collect()
        };

        let major_signed = if direction.is_reversed() {
            -major_center
        } else {
            major_center
        };
        for (id, minor_center) in minor_centers {
            let point = if horizontal {
                Point::new(major_signed, minor_center)
            } else {
                Point::new(minor_center, major_signed)
            };
            centers.insert(id, point);
        }
    }
    centers
}
