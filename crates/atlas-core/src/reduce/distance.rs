//! Distance metrics and pairwise distance tables.

use crate::error::ReduceError;
use crate::vector::Matrix;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Input-space metric used by the neighbor-embedding reducers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    #[default]
    Euclidean,
    Cosine,
}

impl Metric {
    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Metric::Euclidean => squared_euclidean(a, b).sqrt(),
            Metric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }
}

impl FromStr for Metric {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "euclid" => Ok(Metric::Euclidean),
            "cosine" => Ok(Metric::Cosine),
            other => Err(ReduceError::InvalidParameter(format!(
                "unknown metric '{}', expected euclidean or cosine",
                other
            ))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Euclidean => f.write_str("euclidean"),
            Metric::Cosine => f.write_str("cosine"),
        }
    }
}

pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Cosine similarity. Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}

/// Full `n × n` table of `metric` distances between matrix rows.
pub(crate) fn pairwise(matrix: &Matrix, metric: Metric) -> Vec<Vec<f64>> {
    let rows = matrix.rows();
    let row_distances = |i: usize| -> Vec<f64> {
        rows.iter()
            .enumerate()
            .map(|(j, other)| {
                if i == j {
                    0.0
                } else {
                    metric.distance(&rows[i], other)
                }
            })
            .collect()
    };

    #[cfg(feature = "parallel")]
    {
        (0..rows.len()).into_par_iter().map(row_distances).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        (0..rows.len()).map(row_distances).collect()
    }
}
