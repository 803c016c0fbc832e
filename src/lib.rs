pub mod config;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod model;
pub mod progress;
pub mod session;
pub mod solver;
pub mod surface;
pub mod text_metrics;

pub use config::EngineConfig;
pub use error::{LayoutError, Result};
pub use layout::{
    DryRunReport, LayoutEngine, LayoutOutcome, LayoutRequest, LayoutResponse, Scope,
};
pub use model::{Diagram, DiagramEdge, DiagramNode, ElementId, NodeKind};
pub use session::{DiagramId, PinSet, SessionRegistry};
pub use surface::{DiagramSurface, MemoryDiagram, SurfaceError};
