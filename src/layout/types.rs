use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::model::{Direction, ElementId};
use crate::session::DiagramId;

/// Scope of one layout request: the whole diagram, the children of one
/// container, or an explicit element set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scope {
    Whole(WholeToken),
    Container {
        #[serde(rename = "containerId")]
        container_id: ElementId,
    },
    Elements {
        #[serde(rename = "elementIds")]
        element_ids: Vec<ElementId>,
    },
}

/// Keyword form of the full scope, spelled `"full"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WholeToken {
    #[serde(rename = "full")]
    Full,
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Whole(WholeToken::Full)
    }
}

impl Scope {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn container(id: impl Into<ElementId>) -> Self {
        Scope::Container {
            container_id: id.into(),
        }
    }

    pub fn elements<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ElementId>,
    {
        Scope::Elements {
            element_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Scope::Whole(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LaneStrategy {
    /// Keep every node in its current lane; lanes act as grouping
    /// constraints for the solver.
    #[default]
    Preserve,
    /// Flatten lanes into one partition so the solver may reorder rows
    /// freely to reduce crossings.
    Optimize,
}

/// Pool growth options for requests that expand a container to fit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolExpansion {
    /// Target width/height ratio. Clamped into the configured band.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f32>,
    /// Overrides the configured container padding for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRequest {
    #[serde(default)]
    pub diagram_id: DiagramId,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default)]
    pub lane_strategy: LaneStrategy,
    /// Per-request spacing overrides; the engine config supplies the rest.
    #[serde(default)]
    pub node_spacing: Option<f32>,
    #[serde(default)]
    pub layer_spacing: Option<f32>,
    /// Snap node origins to the configured grid when writing back.
    #[serde(default)]
    pub grid_snap: bool,
    /// Re-align the main flow onto one shared row after solving.
    #[serde(default)]
    pub preserve_happy_path: bool,
    /// Compute and report, but apply nothing.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub pool_expansion: Option<PoolExpansion>,
}

impl LayoutRequest {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn scoped(scope: Scope) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }
}

/// Placement path asked for by the request. `Deterministic` only applies
/// to unconstrained full-scope passes over trivially shaped flows; the
/// engine falls back to the solver when the shape does not qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    #[default]
    Full,
    Deterministic,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    /// Mean arclength of routed flows in scope.
    pub avg_flow_length: f32,
    /// Share of flow segments that run axis-parallel, in percent.
    pub orthogonal_flow_percent: f32,
    /// Elements per 100x100 cell of the content bounding box.
    pub element_density: f32,
}

/// Summary returned after a committed pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResponse {
    pub element_count: usize,
    pub labels_moved: usize,
    pub crossing_flows: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub crossing_flow_pairs: Vec<(ElementId, ElementId)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub container_sizing_issues: Vec<String>,
    pub quality_metrics: QualityMetrics,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pinned_skipped: Vec<ElementId>,
}

/// One element's move in a dry-run comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Displacement {
    pub id: ElementId,
    pub from: Point,
    pub to: Point,
    pub distance: f32,
}

/// Preview statistics from a dry-run pass. Nothing was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunReport {
    pub dry_run: bool,
    pub total_elements: usize,
    pub moved_count: usize,
    pub max_displacement: f32,
    pub avg_displacement: f32,
    /// Largest moves first, capped at ten entries.
    pub top_displacements: Vec<Displacement>,
    pub crossing_flows: usize,
    /// Set when more than half the elements move and the largest move
    /// exceeds 200 units. A hint for hosts to confirm before committing.
    pub large_change: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LayoutOutcome {
    Committed(LayoutResponse),
    Preview(DryRunReport),
}

impl LayoutOutcome {
    pub fn as_committed(&self) -> Option<&LayoutResponse> {
        match self {
            LayoutOutcome::Committed(response) => Some(response),
            LayoutOutcome::Preview(_) => None,
        }
    }

    pub fn as_preview(&self) -> Option<&DryRunReport> {
        match self {
            LayoutOutcome::Committed(_) => None,
            LayoutOutcome::Preview(report) => Some(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_accepts_keyword_and_object_forms() {
        let full: Scope = serde_json::from_str(r#""full""#).unwrap();
        assert!(full.is_full());
        let container: Scope = serde_json::from_str(r#"{"containerId": "pool1"}"#).unwrap();
        assert_eq!(container, Scope::container("pool1"));
        let elements: Scope = serde_json::from_str(r#"{"elementIds": ["a", "b"]}"#).unwrap();
        assert_eq!(elements, Scope::elements(["a", "b"]));
    }

    #[test]
    fn request_defaults() {
        let request: LayoutRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.diagram_id, DiagramId::default());
        assert!(request.scope.is_full());
        assert_eq!(request.direction, Direction::LeftRight);
        assert_eq!(request.strategy, StrategyKind::Full);
        assert_eq!(request.lane_strategy, LaneStrategy::Preserve);
        assert!(request.node_spacing.is_none());
        assert!(!request.grid_snap);
        assert!(!request.dry_run);
        assert!(!request.preserve_happy_path);
        assert!(request.pool_expansion.is_none());
    }

    #[test]
    fn request_parses_camel_case_fields() {
        let request: LayoutRequest = serde_json::from_str(
            r#"{
                "diagramId": "order-process",
                "scope": {"elementIds": ["t1"]},
                "direction": "TB",
                "strategy": "deterministic",
                "laneStrategy": "optimize",
                "nodeSpacing": 32,
                "layerSpacing": 90,
                "gridSnap": true,
                "preserveHappyPath": true,
                "dryRun": true,
                "poolExpansion": {"aspectRatio": 4.0}
            }"#,
        )
        .unwrap();
        assert_eq!(request.diagram_id, DiagramId::new("order-process"));
        assert_eq!(request.direction, Direction::TopDown);
        assert_eq!(request.strategy, StrategyKind::Deterministic);
        assert_eq!(request.lane_strategy, LaneStrategy::Optimize);
        assert_eq!(request.node_spacing, Some(32.0));
        assert_eq!(request.layer_spacing, Some(90.0));
        assert!(request.grid_snap);
        assert!(request.preserve_happy_path);
        assert!(request.dry_run);
        assert_eq!(request.pool_expansion.unwrap().aspect_ratio, Some(4.0));
    }

    #[test]
    fn response_serializes_camel_case() {
        let response = LayoutResponse {
            element_count: 3,
            labels_moved: 1,
            crossing_flows: 0,
            crossing_flow_pairs: Vec::new(),
            container_sizing_issues: Vec::new(),
            quality_metrics: QualityMetrics::default(),
            pinned_skipped: Vec::new(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["elementCount"], 3);
        assert!(json.get("crossingFlowPairs").is_none(), "empty lists elided");
        assert!(json["qualityMetrics"]["avgFlowLength"].is_number());
    }
}
