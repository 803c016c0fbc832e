use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Spacing fed to the layout solver and the deterministic placer.
#[derive(Debug, Clone, PartialEq)]
pub struct SpacingConfig {
    /// Gap between neighbouring nodes in the same rank.
    pub node_spacing: f32,
    /// Gap between consecutive ranks.
    pub layer_spacing: f32,
    /// Margin kept around the laid-out content.
    pub margin: f32,
    /// Snap grid for final coordinates. Zero disables snapping.
    pub grid: f32,
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self {
            node_spacing: 50.0,
            layer_spacing: 70.0,
            margin: 40.0,
            grid: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingConfig {
    /// Max center offset on the minor axis for two endpoints to count as
    /// rank-aligned, which allows collapsing their route to a straight line.
    pub align_tolerance: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            align_tolerance: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelConfig {
    /// Gap kept between a label candidate and its owner's box.
    pub clearance: f32,
    /// Margin for the too-close-to-a-shape penalty.
    pub proximity_margin: f32,
    /// Penalty for a candidate crossing one of the owner's own edges.
    pub own_flow_penalty: f32,
    /// Fallback label box for labels without measured bounds.
    pub default_width: f32,
    pub default_height: f32,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            clearance: 6.0,
            proximity_margin: 4.0,
            own_flow_penalty: 4.0,
            default_width: 80.0,
            default_height: 16.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerConfig {
    /// Padding between container border and content on every side.
    pub padding: f32,
    /// Extra padding on the side carrying the container's title band.
    pub header_padding: f32,
    pub lane_min_height: f32,
    /// Width/height ratio band for pool expansion requests.
    pub min_aspect: f32,
    pub max_aspect: f32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            padding: 20.0,
            header_padding: 30.0,
            lane_min_height: 60.0,
            min_aspect: 3.0,
            max_aspect: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeterministicConfig {
    /// Largest split fan-out the closed-form placer accepts before the
    /// request falls through to the solver.
    pub max_branches: usize,
}

impl Default for DeterministicConfig {
    fn default() -> Self {
        Self { max_branches: 4 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontConfig {
    pub family: String,
    pub size: f32,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            family: "sans-serif".to_string(),
            size: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DryRunConfig {
    /// Max displacement above which a preview that moved more than half
    /// of the nodes is flagged as a large change.
    pub large_change_threshold: f32,
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self {
            large_change_threshold: 200.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub spacing: SpacingConfig,
    pub routing: RoutingConfig,
    pub labels: LabelConfig,
    pub containers: ContainerConfig,
    pub deterministic: DeterministicConfig,
    pub font: FontConfig,
    pub dry_run: DryRunConfig,
}

impl EngineConfig {
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = overrides.node_spacing {
            self.spacing.node_spacing = v;
        }
        if let Some(v) = overrides.layer_spacing {
            self.spacing.layer_spacing = v;
        }
        if let Some(v) = overrides.margin {
            self.spacing.margin = v;
        }
        if let Some(v) = overrides.grid_size {
            self.spacing.grid = v;
        }
        if let Some(v) = overrides.route_align_tolerance {
            self.routing.align_tolerance = v;
        }
        if let Some(v) = overrides.label_clearance {
            self.labels.clearance = v;
        }
        if let Some(v) = overrides.label_proximity_margin {
            self.labels.proximity_margin = v;
        }
        if let Some(v) = overrides.own_flow_penalty {
            self.labels.own_flow_penalty = v;
        }
        if let Some(v) = overrides.container_padding {
            self.containers.padding = v;
        }
        if let Some(v) = overrides.header_padding {
            self.containers.header_padding = v;
        }
        if let Some(v) = overrides.lane_min_height {
            self.containers.lane_min_height = v;
        }
        if let Some(v) = overrides.pool_aspect_min {
            self.containers.min_aspect = v;
        }
        if let Some(v) = overrides.pool_aspect_max {
            self.containers.max_aspect = v;
        }
        if let Some(v) = overrides.max_deterministic_branches {
            self.deterministic.max_branches = v;
        }
        if let Some(v) = overrides.font_family.clone() {
            self.font.family = v;
        }
        if let Some(v) = overrides.font_size {
            self.font.size = v;
        }
        if let Some(v) = overrides.large_change_threshold {
            self.dry_run.large_change_threshold = v;
        }
    }

    /// Copy with per-request overrides applied on top.
    pub fn overridden(&self, overrides: &ConfigOverrides) -> Self {
        let mut config = self.clone();
        config.apply_overrides(overrides);
        config
    }
}

/// Flat override set accepted from config files. Every field is optional
/// so partial overrides merge over the defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigOverrides {
    pub node_spacing: Option<f32>,
    pub layer_spacing: Option<f32>,
    pub margin: Option<f32>,
    pub grid_size: Option<f32>,
    pub route_align_tolerance: Option<f32>,
    pub label_clearance: Option<f32>,
    pub label_proximity_margin: Option<f32>,
    pub own_flow_penalty: Option<f32>,
    pub container_padding: Option<f32>,
    pub header_padding: Option<f32>,
    pub lane_min_height: Option<f32>,
    pub pool_aspect_min: Option<f32>,
    pub pool_aspect_max: Option<f32>,
    pub max_deterministic_branches: Option<usize>,
    pub font_family: Option<String>,
    pub font_size: Option<f32>,
    pub large_change_threshold: Option<f32>,
}

/// Loads engine defaults, optionally merged with a JSON or JSON5 override
/// file. Strict JSON is tried first so error positions stay exact for the
/// common case.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let overrides: ConfigOverrides = match serde_json::from_str(&contents) {
        Ok(parsed) => parsed,
        Err(_) => json5::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?,
    };
    config.apply_overrides(&overrides);
    Ok(config)
}
