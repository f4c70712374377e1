//! Record set → numeric matrix extraction.

use super::payload::{Record, VectorPayload, VectorShape};
use crate::error::{ReduceError, Result};

/// Minimum number of rows any reduction accepts.
pub const MIN_POINTS: usize = 2;

/// Row-major matrix of equal-length dense vectors, one row per record.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: Vec<Vec<f64>>,
    dims: usize,
}

impl Matrix {
    /// Build a matrix, rejecting ragged rows and fewer than [`MIN_POINTS`] rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        if rows.is_empty() {
            return Err(ReduceError::NoData);
        }
        if rows.len() < MIN_POINTS {
            return Err(ReduceError::InsufficientData { found: rows.len() });
        }

        let dims = rows[0].len();
        if let Some((row, found)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != dims)
            .map(|(i, r)| (i, r.len()))
        {
            return Err(ReduceError::DimensionMismatch {
                row,
                expected: dims,
                found,
            });
        }

        Ok(Self { rows, dims })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_dims(&self) -> usize {
        self.dims
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }
}

/// Extract a dense matrix from `records`, resolving each vector through `using`.
///
/// Record count is checked before any payload is inspected. Extraction stops
/// at the first record whose resolved vector is not dense; no partial matrix
/// is returned.
pub fn extract(records: &[Record], using: Option<&str>) -> Result<Matrix> {
    if records.is_empty() {
        return Err(ReduceError::NoData);
    }
    if records.len() < MIN_POINTS {
        return Err(ReduceError::InsufficientData {
            found: records.len(),
        });
    }

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        match record.resolve(using) {
            Some(VectorPayload::Dense(values)) => rows.push(values.clone()),
            Some(VectorPayload::Named(_)) if using.is_none() => {
                return Err(ReduceError::UnresolvedSelector);
            }
            Some(other) => {
                return Err(ReduceError::UnsupportedVectorShape {
                    shape: other.shape(),
                });
            }
            None => {
                return Err(ReduceError::UnsupportedVectorShape {
                    shape: VectorShape::Unknown,
                });
            }
        }
    }

    Matrix::from_rows(rows)
}
