use std::collections::BTreeMap;

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::LayoutError;
use crate::geometry::Point;
use crate::model::{Diagram, ElementId};
use crate::progress::ProgressSink;
use crate::session::PinSet;
use crate::solver::LayoutSolver;
use crate::surface::DiagramSurface;

use super::run_pipeline;
use super::types::{Displacement, DryRunReport, LayoutRequest};

/// Moves below this distance count as noise, not as displacement.
const MOVE_EPSILON: f32 = 0.01;
/// Entries kept in the largest-moves list.
const TOP_MOVES: usize = 10;

/// Runs the full pass against a clone of `surface` and measures what would
/// move. The caller's diagram is never touched; the clone is dropped on
/// every path out.
pub(crate) fn preview(
    surface: &dyn DiagramSurface,
    request: &LayoutRequest,
    pins: &PinSet,
    config: &EngineConfig,
    solver: &dyn LayoutSolver,
    progress: &mut dyn ProgressSink,
) -> Result<DryRunReport, LayoutError> {
    let copy = surface
        .clone_boxed()
        .map_err(|err| LayoutError::CloneFailed(err.to_string()))?;
    let mut diagram = Diagram::from_parts(copy.nodes(), copy.edges());
    drop(copy);

    let before: BTreeMap<ElementId, Point> = diagram
        .nodes()
        .map(|node| (node.id.clone(), Point::new(node.rect.x, node.rect.y)))
        .collect();
    let total_elements = before.len();

    let outcome = run_pipeline(&mut diagram, request, pins, config, solver, progress)?;

    let mut moves: Vec<Displacement> = Vec::new();
    for node in diagram.nodes() {
        let Some(&from) = before.get(&node.id) else {
            continue;
        };
        let to = Point::new(node.rect.x, node.rect.y);
        let distance = from.distance_to(to);
        if distance > MOVE_EPSILON {
            moves.push(Displacement {
                id: node.id.clone(),
                from,
                to,
                distance,
            });
        }
    }

    let moved_count = moves.len();
    let max_displacement = moves.iter().map(|m| m.distance).fold(0.0, f32::max);
    let avg_displacement = if moves.is_empty() {
        0.0
    } else {
        moves.iter().map(|m| m.distance).sum::<f32>() / moves.len() as f32
    };
    moves.sort_by(|a, b| {
        b.distance
            .total_cmp(&a.distance)
            .then_with(|| a.id.cmp(&b.id))
    });
    moves.truncate(TOP_MOVES);

    let large_change = moved_count * 2 > total_elements
        && max_displacement > config.dry_run.large_change_threshold;
    debug!(total_elements, moved_count, large_change, "dry run measured");

    Ok(DryRunReport {
        dry_run: true,
        total_elements,
        moved_count,
        max_displacement,
        avg_displacement,
        top_displacements: moves,
        crossing_flows: outcome.crossing_flows,
        large_change,
    })
}
