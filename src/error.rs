use std::path::PathBuf;

use thiserror::Error;

use crate::join::{Level, SpatialRelation};

/// Errors raised by layer loading, joining and mesh serialization.
///
/// All failures are synchronous and fatal to the current operation; nothing
/// here is retriable without changed inputs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("layer not found: {0}")]
    LayerNotFound(String),

    #[error("level {left:?} cannot be joined against level {right:?}")]
    DimensionMismatch { left: Level, right: Level },

    #[error("spatial relation {0:?} is not supported for tridimensional geometries")]
    UnsupportedPredicate(SpatialRelation),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("missing dimension: {0}")]
    MissingDimension(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("codec mismatch: {0}")]
    CodecMismatch(String),

    #[error("working directory not configured")]
    WorkDirNotConfigured,

    #[error("path is not a directory: {}", .0.display())]
    FileSystem(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
