use crate::core::models::geometry::GeometryError;
use crate::core::store::StoreError;
use crate::engine::compute::ComputeError;
use crate::engine::dedup::DedupError;
use crate::engine::lease::LeaseError;
use crate::engine::toolkit::ToolkitError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("Computation engine failure: {0}")]
    Compute(#[from] ComputeError),

    #[error("Geometry toolkit failure: {0}")]
    Toolkit(#[from] ToolkitError),

    #[error("Invalid structure: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Deduplication failure: {0}")]
    Dedup(#[from] DedupError),

    #[error("Lease bookkeeping failure: {0}")]
    Lease(#[from] LeaseError),

    #[error("I/O error at '{path}': {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
