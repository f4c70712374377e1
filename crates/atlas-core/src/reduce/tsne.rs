//! Exact t-SNE.
//!
//! Input affinities use a per-point Gaussian whose bandwidth is tuned by
//! binary search to the requested perplexity. The 2D layout is optimised by
//! gradient descent on the KL divergence against Student-t affinities, with
//! momentum, adaptive gains and early exaggeration. Cost is `O(n²)` per
//! iteration, which is fine for the few thousand points a chart can show.

use super::distance::{pairwise, Metric};
use super::{seeded_rng, IterativeReducer, Step};
use crate::vector::Matrix;
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::debug;

const EXAGGERATION: f64 = 4.0;
const EXAGGERATION_ITERATIONS: usize = 100;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MOMENTUM_SWITCH: usize = 250;
const MIN_GAIN: f64 = 0.01;
const MIN_PROBABILITY: f64 = 1e-12;
const ENTROPY_TOLERANCE: f64 = 1e-5;
const MAX_BANDWIDTH_STEPS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct TsneConfig {
    pub perplexity: f64,
    /// Learning rate
    pub epsilon: f64,
    pub iterations: usize,
    pub metric: Metric,
    pub seed: Option<u64>,
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            perplexity: 50.0,
            epsilon: 10.0,
            iterations: 500,
            metric: Metric::Euclidean,
            seed: None,
        }
    }
}

pub struct Tsne {
    n: usize,
    /// Symmetric joint probabilities, row-major `n × n`
    p: Vec<f64>,
    embedding: Vec<[f64; 2]>,
    gains: Vec<[f64; 2]>,
    velocity: Vec<[f64; 2]>,
    /// Per-step scratch, reused: Student-t numerators (`n × n`) and gradient
    affinity: Vec<f64>,
    grad: Vec<[f64; 2]>,
    iteration: usize,
    config: TsneConfig,
}

impl Tsne {
    pub fn new(matrix: &Matrix, config: TsneConfig) -> Self {
        let n = matrix.n_rows();
        let mut distances = pairwise(matrix, config.metric);
        if config.metric == Metric::Euclidean {
            for row in &mut distances {
                for d in row.iter_mut() {
                    *d *= *d;
                }
            }
        }

        let p = joint_probabilities(&distances, config.perplexity);

        let mut rng = seeded_rng(config.seed);
        let embedding = (0..n)
            .map(|_| {
                let x: f64 = rng.sample(StandardNormal);
                let y: f64 = rng.sample(StandardNormal);
                [x * 1e-4, y * 1e-4]
            })
            .collect();

        debug!(
            "t-SNE prepared: {} points, perplexity {}, {} iterations",
            n, config.perplexity, config.iterations
        );

        Self {
            n,
            p,
            embedding,
            gains: vec![[1.0, 1.0]; n],
            velocity: vec![[0.0, 0.0]; n],
            affinity: vec![0.0; n * n],
            grad: vec![[0.0, 0.0]; n],
            iteration: 0,
            config,
        }
    }

    /// Fill `self.grad` for the current layout.
    fn compute_gradient(&mut self) {
        let n = self.n;
        let y = &self.embedding;
        let num = &mut self.affinity;
        let exaggeration = if self.iteration < EXAGGERATION_ITERATIONS {
            EXAGGERATION
        } else {
            1.0
        };

        // Unnormalised Student-t affinities
        let mut sum_q = 0.0f64;
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = y[i][0] - y[j][0];
                let dy = y[i][1] - y[j][1];
                let q = 1.0 / (1.0 + dx * dx + dy * dy);
                num[i * n + j] = q;
                num[j * n + i] = q;
                sum_q += 2.0 * q;
            }
        }
        let sum_q = sum_q.max(f64::MIN_POSITIVE);

        for i in 0..n {
            let mut gx = 0.0f64;
            let mut gy = 0.0f64;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q = num[i * n + j];
                let coeff = 4.0 * (exaggeration * self.p[i * n + j] - q / sum_q) * q;
                gx += coeff * (y[i][0] - y[j][0]);
                gy += coeff * (y[i][1] - y[j][1]);
            }
            self.grad[i] = [gx, gy];
        }
    }
}

impl IterativeReducer for Tsne {
    fn step(&mut self) -> Step<'_> {
        if self.iteration < self.config.iterations {
            self.compute_gradient();
            let momentum = if self.iteration < MOMENTUM_SWITCH {
                INITIAL_MOMENTUM
            } else {
                FINAL_MOMENTUM
            };

            for i in 0..self.n {
                for d in 0..2 {
                    let g = self.grad[i][d];
                    let v = self.velocity[i][d];
                    let gain = if g.signum() == v.signum() {
                        self.gains[i][d] * 0.8
                    } else {
                        self.gains[i][d] + 0.2
                    };
                    let gain = gain.max(MIN_GAIN);
                    self.gains[i][d] = gain;

                    let v = momentum * v - self.config.epsilon * gain * g;
                    self.velocity[i][d] = v;
                    self.embedding[i][d] += v;
                }
            }

            recenter(&mut self.embedding);
            self.iteration += 1;
        }

        Step {
            embedding: &self.embedding,
            is_final: self.iteration >= self.config.iterations,
        }
    }

    fn iteration(&self) -> usize {
        self.iteration
    }

    fn total_iterations(&self) -> usize {
        self.config.iterations
    }
}

fn recenter(embedding: &mut [[f64; 2]]) {
    let n = embedding.len() as f64;
    let (sx, sy) = embedding
        .iter()
        .fold((0.0f64, 0.0f64), |(sx, sy), p| (sx + p[0], sy + p[1]));
    let (mx, my) = (sx / n, sy / n);
    for p in embedding.iter_mut() {
        p[0] -= mx;
        p[1] -= my;
    }
}

/// Symmetrised joint probabilities `P = (P_cond + P_condᵀ) / 2n`.
///
/// `distances` are the dissimilarities fed to the Gaussian kernel (squared
/// Euclidean distances for the Euclidean metric).
pub(crate) fn joint_probabilities(distances: &[Vec<f64>], perplexity: f64) -> Vec<f64> {
    let n = distances.len();
    let perplexity = perplexity.min((n - 1) as f64).max(1.0);
    let target_entropy = perplexity.ln();

    let mut conditional = vec![0.0; n * n];
    for (i, row) in distances.iter().enumerate() {
        let probabilities = row_probabilities(row, i, target_entropy);
        conditional[i * n..(i + 1) * n].copy_from_slice(&probabilities);
    }

    let mut p = vec![0.0; n * n];
    let norm = 2.0 * n as f64;
    for i in 0..n {
        for j in 0..n {
            if i != j {
                let v = (conditional[i * n + j] + conditional[j * n + i]) / norm;
                p[i * n + j] = v.max(MIN_PROBABILITY);
            }
        }
    }
    p
}

/// Conditional probabilities `p(j | i)` with the bandwidth that matches the
/// target entropy. Distances are shifted by the row minimum so the kernel
/// cannot underflow to an all-zero row.
fn row_probabilities(row: &[f64], i: usize, target_entropy: f64) -> Vec<f64> {
    let min = row
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .map(|(_, &d)| d)
        .fold(f64::INFINITY, f64::min);
    let shifted: Vec<f64> = row.iter().map(|&d| d - min).collect();

    let mut beta = 1.0f64;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;
    let mut probabilities = vec![0.0; row.len()];

    for _ in 0..MAX_BANDWIDTH_STEPS {
        let mut sum = 0.0f64;
        let mut weighted = 0.0f64;
        for (j, &d) in shifted.iter().enumerate() {
            let v = if j == i { 0.0 } else { (-d * beta).exp() };
            probabilities[j] = v;
            sum += v;
            weighted += d * v;
        }

        let entropy = sum.ln() + beta * weighted / sum;
        let diff = entropy - target_entropy;
        if diff.abs() < ENTROPY_TOLERANCE {
            break;
        }

        if diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_infinite() {
                beta * 2.0
            } else {
                (beta + beta_max) / 2.0
            };
        } else {
            beta_max = beta;
            beta = if beta_min.is_infinite() {
                beta / 2.0
            } else {
                (beta + beta_min) / 2.0
            };
        }
    }

    let sum: f64 = probabilities.iter().sum();
    for v in &mut probabilities {
        *v /= sum;
    }
    probabilities
}
