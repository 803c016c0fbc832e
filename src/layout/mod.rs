pub(crate) mod containers;
pub(crate) mod deterministic;
pub(crate) mod dry_run;
pub(crate) mod graph;
pub(crate) mod happy_path;
pub(crate) mod label_placement;
pub(crate) mod pins;
pub(crate) mod routing;
pub(crate) mod types;

pub use types::*;

use std::collections::BTreeMap;
use std::sync::PoisonError;

use tracing::{debug, info};

use crate::config::{ConfigOverrides, EngineConfig};
use crate::error::LayoutError;
use crate::geometry::{Point, Rect};
use crate::model::{Diagram, ElementId, Label};
use crate::progress::{NullProgress, ProgressSink, ProgressStage};
use crate::session::{PinSet, SessionRegistry};
use crate::solver::{DagreSolver, LayoutSolver};
use crate::surface::DiagramSurface;

/// Stateful entry point. One engine serves many diagrams; per-diagram
/// session state lives in the registry, and committed passes on the same
/// diagram are serialized through it.
pub struct LayoutEngine {
    config: EngineConfig,
    solver: Box<dyn LayoutSolver + Send + Sync>,
    registry: SessionRegistry,
}

impl LayoutEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_solver(config, Box::new(DagreSolver::new()))
    }

    /// Swaps the layered solver, mainly for tests and experiments.
    pub fn with_solver(config: EngineConfig, solver: Box<dyn LayoutSolver + Send + Sync>) -> Self {
        Self {
            config,
            solver,
            registry: SessionRegistry::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Session registry, exposed so hosts can manage pins and close idle
    /// diagrams.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Runs one layout request against `surface`.
    ///
    /// Committed passes compute the whole result on an in-memory copy and
    /// only then touch the surface, so a failed pass leaves the surface
    /// exactly as it was. Dry runs never touch it at all.
    pub fn run(
        &self,
        surface: &mut dyn DiagramSurface,
        request: &LayoutRequest,
    ) -> Result<LayoutOutcome, LayoutError> {
        self.run_with_progress(surface, request, &mut NullProgress)
    }

    pub fn run_with_progress(
        &self,
        surface: &mut dyn DiagramSurface,
        request: &LayoutRequest,
        progress: &mut dyn ProgressSink,
    ) -> Result<LayoutOutcome, LayoutError> {
        let config = self.effective_config(request);
        let session = self.registry.session(&request.diagram_id);
        let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);

        if request.dry_run {
            // A preview only needs the pin snapshot from the session; the
            // pass itself runs on an isolated clone.
            let pins = session.pins.clone();
            drop(session);
            let report =
                dry_run::preview(surface, request, &pins, &config, self.solver.as_ref(), progress)?;
            progress.report(ProgressStage::Done);
            return Ok(LayoutOutcome::Preview(report));
        }

        let mut diagram = Diagram::from_parts(surface.nodes(), surface.edges());
        let before = SurfaceSnapshot::of(&diagram);
        let outcome = run_pipeline(
            &mut diagram,
            request,
            &session.pins,
            &config,
            self.solver.as_ref(),
            progress,
        )?;
        let applied = before.apply_changes(&diagram, surface)?;
        surface.save()?;
        if matches!(request.scope, Scope::Whole(_)) {
            session.pins.clear();
        }
        progress.report(ProgressStage::Done);
        info!(
            diagram = request.diagram_id.as_str(),
            elements = outcome.element_count,
            applied,
            crossings = outcome.crossing_flows,
            "layout committed"
        );
        Ok(LayoutOutcome::Committed(LayoutResponse {
            element_count: outcome.element_count,
            labels_moved: outcome.labels_moved,
            crossing_flows: outcome.crossing_flows,
            crossing_flow_pairs: outcome.crossing_flow_pairs,
            container_sizing_issues: outcome.container_sizing_issues,
            quality_metrics: outcome.quality_metrics,
            pinned_skipped: outcome.pinned_skipped,
        }))
    }

    fn effective_config(&self, request: &LayoutRequest) -> EngineConfig {
        let mut config = self.config.clone();
        config.apply_overrides(&ConfigOverrides {
            node_spacing: request.node_spacing,
            layer_spacing: request.layer_spacing,
            ..ConfigOverrides::default()
        });
        config
    }
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Everything one pass reports back, independent of whether the result is
/// committed or only measured.
#[derive(Debug, Clone)]
pub(crate) struct PassOutcome {
    pub element_count: usize,
    pub labels_moved: usize,
    pub crossing_flows: usize,
    pub crossing_flow_pairs: Vec<(ElementId, ElementId)>,
    pub container_sizing_issues: Vec<String>,
    pub quality_metrics: QualityMetrics,
    pub pinned_skipped: Vec<ElementId>,
}

/// Runs the full pass on `diagram` in place: scope resolution, placement,
/// routing, labels, container sizing, analysis. Committed and dry-run
/// requests go through this same path.
pub(crate) fn run_pipeline(
    diagram: &mut Diagram,
    request: &LayoutRequest,
    pins: &PinSet,
    config: &EngineConfig,
    solver: &dyn LayoutSolver,
    progress: &mut dyn ProgressSink,
) -> Result<PassOutcome, LayoutError> {
    progress.report(ProgressStage::Prepare);
    let plan = graph::plan_scope(diagram, &request.scope, pins)?;
    let pinned_routes = pins::PinnedRoutes::capture(diagram, &plan);
    if !pinned_routes.is_empty() {
        debug!(count = pinned_routes.len(), "pinned routes captured");
    }

    progress.report(ProgressStage::Solve);
    let mut centers = None;
    if request.strategy == StrategyKind::Deterministic && matches!(request.scope, Scope::Whole(_)) {
        centers = deterministic::try_layout(diagram, &plan, request, config);
    }
    let via_solver = centers.is_none();
    let centers = match centers {
        Some(centers) => centers,
        None => solve(diagram, &plan, request, config, solver)?,
    };
    let grid = if request.grid_snap {
        config.spacing.grid
    } else {
        0.0
    };
    graph::apply_solved_positions(diagram, &plan, &centers, grid);

    progress.report(ProgressStage::PostProcess);
    if request.preserve_happy_path && via_solver {
        let path = happy_path::find_happy_path(diagram);
        happy_path::align_to_row(diagram, &plan, &path, request.direction);
    }
    routing::route_edges(diagram, &plan, request.direction, config);
    pinned_routes.restore(diagram);

    progress.report(ProgressStage::Labels);
    let labels_moved = label_placement::place_labels(diagram, &plan, request.direction, config);

    progress.report(ProgressStage::Containers);
    let container_sizing_issues = containers::autosize_containers(
        diagram,
        &plan,
        request.direction,
        config,
        request.pool_expansion.as_ref(),
    );

    let (crossing_flows, crossing_flow_pairs) = routing::analyze_crossings(diagram);
    let quality_metrics = routing::quality_metrics(diagram);

    Ok(PassOutcome {
        element_count: plan.movable.len() + plan.reroute.len(),
        labels_moved,
        crossing_flows,
        crossing_flow_pairs,
        container_sizing_issues,
        quality_metrics,
        pinned_skipped: plan.pinned_skipped,
    })
}

fn solve(
    diagram: &Diagram,
    plan: &graph::ScopePlan,
    request: &LayoutRequest,
    config: &EngineConfig,
    solver: &dyn LayoutSolver,
) -> Result<BTreeMap<ElementId, Point>, LayoutError> {
    let graph = graph::build_solver_graph(diagram, plan, request, config);
    if graph.is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(solver.solve(&graph)?.centers)
}

/// Pre-pass copy of everything the apply step may write back, used to turn
/// the solved diagram into a minimal set of surface mutations.
struct SurfaceSnapshot {
    nodes: BTreeMap<ElementId, (Rect, Option<Label>)>,
    edges: BTreeMap<ElementId, (Vec<Point>, Option<Label>)>,
}

impl SurfaceSnapshot {
    fn of(diagram: &Diagram) -> Self {
        Self {
            nodes: diagram
                .nodes()
                .map(|node| (node.id.clone(), (node.rect, node.label.clone())))
                .collect(),
            edges: diagram
                .edges()
                .map(|edge| (edge.id.clone(), (edge.waypoints.clone(), edge.label.clone())))
                .collect(),
        }
    }

    /// Pushes every difference between the snapshot and the solved diagram
    /// through the surface mutators. Returns the mutation count.
    fn apply_changes(
        &self,
        diagram: &Diagram,
        surface: &mut dyn DiagramSurface,
    ) -> Result<usize, LayoutError> {
        let mut applied = 0;
        for node in diagram.nodes() {
            let Some((rect, label)) = self.nodes.get(&node.id) else {
                continue;
            };
            if node.rect.width != rect.width || node.rect.height != rect.height {
                surface.resize(&node.id, node.rect)?;
                applied += 1;
            } else if node.rect.x != rect.x || node.rect.y != rect.y {
                surface.apply_position(&node.id, Point::new(node.rect.x, node.rect.y))?;
                applied += 1;
            }
            if let Some(placed) = &node.label
                && label_changed(label.as_ref(), placed)
            {
                surface.apply_label_bounds(&node.id, placed.rect, placed.orientation)?;
                applied += 1;
            }
        }
        for edge in diagram.edges() {
            let Some((waypoints, label)) = self.edges.get(&edge.id) else {
                continue;
            };
            if edge.waypoints != *waypoints {
                surface.apply_waypoints(&edge.id, &edge.waypoints)?;
                applied += 1;
            }
            if let Some(placed) = &edge.label
                && label_changed(label.as_ref(), placed)
            {
                surface.apply_label_bounds(&edge.id, placed.rect, placed.orientation)?;
                applied += 1;
            }
        }
        Ok(applied)
    }
}

fn label_changed(before: Option<&Label>, after: &Label) -> bool {
    before.is_none_or(|label| label.rect != after.rect || label.orientation != after.orientation)
}
