//! Error types for extraction and reduction.

use crate::vector::VectorShape;
use thiserror::Error;

/// Input errors detected before any reduction work starts.
///
/// Every variant is a caller-input problem: none of them is retryable and
/// each one short-circuits the whole request without producing a frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReduceError {
    #[error("no data found")]
    NoData,

    #[error("cannot reduce {found} vector(s), at least 2 are required")]
    InsufficientData { found: usize },

    #[error("select a valid vector name with the `using` parameter, default vector is not defined")]
    UnresolvedSelector,

    #[error("visualization of \"{shape}\" vectors is not supported")]
    UnsupportedVectorShape { shape: VectorShape },

    #[error("unsupported algorithm '{0}', expected one of: PCA, UMAP, TSNE")]
    UnsupportedAlgorithm(String),

    #[error("vector {row} has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, ReduceError>;
