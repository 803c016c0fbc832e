use thiserror::Error;

use crate::model::ElementId;
use crate::solver::SolverError;
use crate::surface::SurfaceError;

/// Failure modes of a layout request. Layout-stage failures are raised
/// before any surface mutator runs, so the diagram stays untouched.
/// `Surface` is the exception: a mutator rejecting a change aborts the
/// apply step mid-way, before `save` persists anything.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LayoutError {
    #[error("scope references unknown element `{0}`")]
    UnknownElement(ElementId),
    #[error("layout solver failed: {0}")]
    Solver(#[from] SolverError),
    #[error("could not clone diagram for dry run: {0}")]
    CloneFailed(String),
    #[error("surface rejected a mutation: {0}")]
    Surface(#[from] SurfaceError),
}

pub type Result<T> = std::result::Result<T, LayoutError>;
