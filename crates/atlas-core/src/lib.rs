//! Atlas Core Engine
//!
//! Computational kernel behind the collection visualization view: turns a
//! batch of retrieved points into 2D coordinates for plotting.
//!
//! # Features
//!
//! - `parallel` - Parallel pairwise distance computation via rayon
//!
//! # Example
//!
//! ```rust
//! use atlas_core::{reduce, Algorithm, Matrix, ReductionParams};
//!
//! let matrix = Matrix::from_rows(vec![
//!     vec![0.0, 0.0],
//!     vec![1.0, 1.0],
//!     vec![2.0, 2.0],
//! ]).unwrap();
//!
//! let params = ReductionParams::with_algorithm(Algorithm::Pca);
//! let frames: Vec<_> = reduce(&matrix, &params).unwrap().collect();
//! assert_eq!(frames.len(), 1);
//! assert!(frames[0].is_final);
//! ```

pub mod error;
pub mod frame;
pub mod pipeline;
pub mod reduce;
pub mod schedule;
pub mod vector;

// Re-export main types at crate root
pub use error::{ReduceError, Result};
pub use frame::{Point, ReductionFrame};
pub use pipeline::reduce_records;
pub use reduce::{
    reduce, reduce_with, Algorithm, FrameStream, IterativeReducer, Metric, ReductionParams, Step,
    Tsne, TsneConfig, Umap, UmapConfig,
};
pub use schedule::{ProgressScheduler, MESSAGE_INTERVAL};
pub use vector::{extract, Matrix, PointId, Record, SparseVector, VectorPayload, VectorShape};
