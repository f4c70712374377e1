//! 2D output frames.

use serde::{Deserialize, Serialize};

/// A single projected point. Coordinates are left unscaled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// One emitted set of coordinates, index-aligned with the input rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionFrame {
    pub points: Vec<Point>,
    pub is_final: bool,
}

impl ReductionFrame {
    /// Copy an embedding into a frame. The embedding keeps being updated by
    /// its reducer, the frame never is.
    pub fn from_embedding(embedding: &[[f64; 2]], is_final: bool) -> Self {
        Self {
            points: embedding.iter().map(|&[x, y]| Point { x, y }).collect(),
            is_final,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
