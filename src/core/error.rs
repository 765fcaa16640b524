//! Error types for the voxterra streaming pipeline

use thiserror::Error;

use crate::math::grid::GridPos;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// No free pool slot when one was required. Indicates a load/unload
    /// accounting bug: shell sizes always match on a directional move.
    #[error("no free pool slot while loading {0:?}")]
    ResourceExhausted(GridPos),

    /// A request was consumed before its poll reported completion.
    #[error("consumed request for {0:?} before it completed")]
    StaleConsume(GridPos),

    #[error("LOD {lod} out of range (table has {count} levels)")]
    OutOfRangeLod { lod: usize, count: usize },

    #[error("invalid grid position {0:?}")]
    InvalidGridPos(GridPos),

    #[error("unknown viewer {0}")]
    UnknownViewer(usize),

    #[error("compute error: {0}")]
    Compute(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
