//! Dimensionality reduction to 2D
//!
//! Three algorithms are available:
//!
//! - **PCA** - deterministic linear projection, computed in one pass
//! - **t-SNE** - exact t-distributed stochastic neighbor embedding
//! - **UMAP** - uniform manifold approximation and projection
//!
//! The two neighbor-embedding algorithms are [`IterativeReducer`]s: an
//! explicit step function that advances one iteration and hands back the
//! current layout. [`FrameStream`] drives the steps and asks a
//! [`ProgressScheduler`] which intermediate layouts become frames.

pub mod distance;
pub mod pca;
pub mod tsne;
pub mod umap;

pub use distance::Metric;
pub use tsne::{Tsne, TsneConfig};
pub use umap::{Umap, UmapConfig};

use crate::error::{ReduceError, Result};
use crate::frame::ReductionFrame;
use crate::schedule::ProgressScheduler;
use crate::vector::Matrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Reduction algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Algorithm {
    Pca,
    #[default]
    Umap,
    Tsne,
}

impl FromStr for Algorithm {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PCA" => Ok(Algorithm::Pca),
            "UMAP" => Ok(Algorithm::Umap),
            "TSNE" | "T-SNE" => Ok(Algorithm::Tsne),
            _ => Err(ReduceError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Pca => f.write_str("PCA"),
            Algorithm::Umap => f.write_str("UMAP"),
            Algorithm::Tsne => f.write_str("TSNE"),
        }
    }
}

/// Request parameters as sent by the visualization page.
///
/// Every field is optional; hyperparameters that do not apply to the chosen
/// algorithm are ignored. Unknown fields (`limit`, `filter`, `color_by`) are
/// accepted and dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReductionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub using: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perplexity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_neighbors: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_dist: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl ReductionParams {
    pub fn with_algorithm(algorithm: Algorithm) -> Self {
        Self {
            algorithm: Some(algorithm.to_string()),
            ..Self::default()
        }
    }

    /// Selected algorithm; UMAP when none is given.
    pub fn algorithm(&self) -> Result<Algorithm> {
        match &self.algorithm {
            Some(name) => name.parse(),
            None => Ok(Algorithm::default()),
        }
    }

    fn metric(&self) -> Result<Metric> {
        self.metric
            .as_deref()
            .map_or(Ok(Metric::default()), str::parse)
    }

    fn iterations(&self, default: usize) -> Result<usize> {
        match self.iterations {
            Some(0) => Err(ReduceError::InvalidParameter(
                "iterations must be at least 1".to_string(),
            )),
            Some(n) => Ok(n),
            None => Ok(default),
        }
    }

    pub fn tsne_config(&self) -> Result<TsneConfig> {
        let defaults = TsneConfig::default();
        let perplexity = positive("perplexity", self.perplexity, defaults.perplexity)?;
        let epsilon = positive("epsilon", self.epsilon, defaults.epsilon)?;

        Ok(TsneConfig {
            perplexity,
            epsilon,
            iterations: self.iterations(defaults.iterations)?,
            metric: self.metric()?,
            seed: self.seed,
        })
    }

    pub fn umap_config(&self) -> Result<UmapConfig> {
        let defaults = UmapConfig::default();
        let n_neighbors = match self.n_neighbors {
            Some(0) => {
                return Err(ReduceError::InvalidParameter(
                    "n_neighbors must be at least 1".to_string(),
                ))
            }
            Some(k) => k,
            None => defaults.n_neighbors,
        };
        let spread = positive("spread", self.spread, defaults.spread)?;
        let min_dist = match self.min_dist {
            Some(d) if !(d >= 0.0 && d.is_finite()) => {
                return Err(ReduceError::InvalidParameter(format!(
                    "min_dist must be non-negative, got {}",
                    d
                )))
            }
            Some(d) => d,
            None => defaults.min_dist,
        };

        Ok(UmapConfig {
            n_neighbors,
            min_dist,
            spread,
            iterations: self.iterations(defaults.iterations)?,
            metric: self.metric()?,
            seed: self.seed,
        })
    }
}

fn positive(name: &str, value: Option<f64>, default: f64) -> Result<f64> {
    match value {
        Some(v) if v > 0.0 && v.is_finite() => Ok(v),
        Some(v) => Err(ReduceError::InvalidParameter(format!(
            "{} must be positive, got {}",
            name, v
        ))),
        None => Ok(default),
    }
}

/// Output of one iteration.
#[derive(Debug)]
pub struct Step<'a> {
    /// Current layout, index-aligned with the input rows
    pub embedding: &'a [[f64; 2]],
    pub is_final: bool,
}

/// A resumable reduction advanced one iteration per call.
///
/// Once a step reports `is_final`, further calls return the same layout
/// without doing more work.
pub trait IterativeReducer: Send {
    fn step(&mut self) -> Step<'_>;

    /// Iterations completed so far.
    fn iteration(&self) -> usize;

    fn total_iterations(&self) -> usize;
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

enum Pending {
    OneShot(Vec<[f64; 2]>),
    Iterative(Box<dyn IterativeReducer>),
    Done,
}

/// Lazy, finite sequence of frames for one request.
///
/// Ends with exactly one frame marked final; the stream cannot be restarted.
pub struct FrameStream {
    algorithm: Algorithm,
    pending: Pending,
    scheduler: ProgressScheduler,
    emitted: usize,
}

impl FrameStream {
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Frames handed out so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl Iterator for FrameStream {
    type Item = ReductionFrame;

    fn next(&mut self) -> Option<ReductionFrame> {
        let frame = match &mut self.pending {
            Pending::Done => return None,
            Pending::OneShot(embedding) => ReductionFrame::from_embedding(embedding, true),
            Pending::Iterative(reducer) => loop {
                let step = reducer.step();
                if self.scheduler.admit(step.is_final) {
                    break ReductionFrame::from_embedding(step.embedding, step.is_final);
                }
            },
        };

        if frame.is_final {
            self.pending = Pending::Done;
        }
        self.emitted += 1;
        debug!(
            "{} frame {} ({} points, final={})",
            self.algorithm,
            self.emitted,
            frame.len(),
            frame.is_final
        );
        Some(frame)
    }
}

/// Reduce `matrix` with the default 200 ms progress interval.
pub fn reduce(matrix: &Matrix, params: &ReductionParams) -> Result<FrameStream> {
    reduce_with(matrix, params, ProgressScheduler::default())
}

/// Reduce `matrix`, gating intermediate frames through `scheduler`.
///
/// The algorithm and its hyperparameters are validated before any work is
/// done. PCA is computed here; the iterative algorithms precompute their
/// input affinities here and iterate lazily as the stream is consumed.
pub fn reduce_with(
    matrix: &Matrix,
    params: &ReductionParams,
    scheduler: ProgressScheduler,
) -> Result<FrameStream> {
    let algorithm = params.algorithm()?;

    let pending = match algorithm {
        Algorithm::Pca => Pending::OneShot(pca::project(matrix)),
        Algorithm::Tsne => {
            let config = params.tsne_config()?;
            Pending::Iterative(Box::new(Tsne::new(matrix, config)))
        }
        Algorithm::Umap => {
            let config = params.umap_config()?;
            Pending::Iterative(Box::new(Umap::new(matrix, config)))
        }
    };

    Ok(FrameStream {
        algorithm,
        pending,
        scheduler,
        emitted: 0,
    })
}
