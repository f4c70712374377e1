//! Principal component projection.
//!
//! The two leading principal axes are found by orthogonal power iteration on
//! the implicit covariance `Xᵀ X` of the centered data, so the `d × d`
//! covariance matrix is never materialised. The starting basis comes from a
//! fixed seed, which keeps the projection deterministic.

use crate::vector::Matrix;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const SEED: u64 = 0x9E37_79B9_7F4A_7C15;
const MAX_ITERATIONS: usize = 256;
const TOLERANCE: f64 = 1e-12;

/// Project `matrix` onto its first two principal components.
pub fn project(matrix: &Matrix) -> Vec<[f64; 2]> {
    let n = matrix.n_rows();
    let d = matrix.n_dims();

    let x = Array2::from_shape_fn((n, d), |(i, j)| matrix.row(i)[j]);
    let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(d));
    let centered = &x - &mean;

    // Unit max-abs scale keeps Xᵀ X finite for huge but finite inputs
    let magnitude = centered.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if d == 0 || magnitude == 0.0 || !magnitude.is_finite() {
        return vec![[0.0, 0.0]; n];
    }
    let centered = centered / magnitude;

    let mut rng = StdRng::seed_from_u64(SEED);
    let mut basis = Array2::from_shape_fn((d, 2), |_| rng.gen_range(-1.0f64..1.0));
    orthonormalize(&mut basis);

    let mut iterations = 0;
    for _ in 0..MAX_ITERATIONS {
        iterations += 1;
        let scores = centered.dot(&basis);
        let mut next = centered.t().dot(&scores);
        orthonormalize(&mut next);

        let drift = (0..2)
            .map(|c| column_drift(next.column(c), basis.column(c)))
            .fold(0.0f64, f64::max);
        basis = next;
        if drift < TOLERANCE {
            break;
        }
    }

    for mut column in basis.columns_mut() {
        if dominant_sign(column.view()) < 0.0 {
            column.mapv_inplace(|v| -v);
        }
    }

    let projected = centered.dot(&basis);
    debug!(
        "PCA converged after {} iterations ({} points, {} dims)",
        iterations, n, d
    );

    projected
        .axis_iter(Axis(0))
        .map(|row| [row[0] * magnitude, row[1] * magnitude])
        .collect()
}

/// Gram-Schmidt over the two columns. A column that collapses relative to
/// the leading one is zeroed, which is what rank-deficient data produces.
fn orthonormalize(basis: &mut Array2<f64>) {
    let scale = basis.column(0).dot(&basis.column(0)).sqrt();
    let threshold = f64::EPSILON.sqrt() * scale.max(f64::MIN_POSITIVE);

    if scale <= f64::MIN_POSITIVE {
        basis.fill(0.0);
        return;
    }
    basis.column_mut(0).mapv_inplace(|v| v / scale);

    let first = basis.column(0).to_owned();
    let overlap = first.dot(&basis.column(1));
    let mut second = basis.column_mut(1);
    second.scaled_add(-overlap, &first);

    let norm = second.dot(&second).sqrt();
    if norm <= threshold {
        second.fill(0.0);
    } else {
        second.mapv_inplace(|v| v / norm);
    }
}

/// How far a unit column moved between iterations. Zeroed columns that stay
/// zeroed have settled.
fn column_drift(next: ArrayView1<'_, f64>, prev: ArrayView1<'_, f64>) -> f64 {
    let next_zero = next.iter().all(|&v| v == 0.0);
    let prev_zero = prev.iter().all(|&v| v == 0.0);
    match (next_zero, prev_zero) {
        (true, true) => 0.0,
        (false, false) => 1.0 - next.dot(&prev).abs(),
        _ => 1.0,
    }
}

/// Sign of the largest-magnitude component.
fn dominant_sign(column: ArrayView1<'_, f64>) -> f64 {
    column
        .iter()
        .copied()
        .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best })
        .signum()
}
