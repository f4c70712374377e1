//! UMAP layout.
//!
//! Builds the fuzzy k-nearest-neighbour graph of the input (brute force, so
//! `O(n²)` distances), then optimises a random initial layout with
//! epoch-scheduled SGD: every edge is sampled in proportion to its weight
//! and paired with a few random negative samples. One call to `step` runs one
//! epoch.

use super::distance::{pairwise, Metric};
use super::{seeded_rng, IterativeReducer, Step};
use crate::vector::Matrix;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::debug;

const NEGATIVE_SAMPLE_RATE: usize = 5;
const REPULSION_STRENGTH: f64 = 1.0;
const LEARNING_RATE: f64 = 1.0;
const GRADIENT_CLIP: f64 = 4.0;
const INIT_RANGE: f64 = 10.0;
const BANDWIDTH_TOLERANCE: f64 = 1e-5;
const MAX_BANDWIDTH_STEPS: usize = 64;
const MIN_K_DIST_SCALE: f64 = 1e-3;
const CURVE_SAMPLES: usize = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct UmapConfig {
    pub n_neighbors: usize,
    pub min_dist: f64,
    pub spread: f64,
    /// Number of optimisation epochs
    pub iterations: usize,
    pub metric: Metric,
    pub seed: Option<u64>,
}

impl Default for UmapConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            min_dist: 0.1,
            spread: 1.0,
            iterations: 350,
            metric: Metric::Euclidean,
            seed: None,
        }
    }
}

/// Directed edge of the symmetrised fuzzy graph with its sampling schedule.
#[derive(Debug, Clone)]
struct Edge {
    head: usize,
    tail: usize,
    epochs_per_sample: f64,
    next_sample: f64,
    epochs_per_negative_sample: f64,
    next_negative_sample: f64,
}

pub struct Umap {
    edges: Vec<Edge>,
    a: f64,
    b: f64,
    embedding: Vec<[f64; 2]>,
    rng: StdRng,
    epoch: usize,
    config: UmapConfig,
}

impl Umap {
    pub fn new(matrix: &Matrix, config: UmapConfig) -> Self {
        let n = matrix.n_rows();
        let k = config.n_neighbors.min(n - 1).max(1);

        let graph = fuzzy_graph(matrix, k, config.metric);
        let max_weight = graph.values().copied().fold(0.0f64, f64::max);
        let epochs = config.iterations as f64;

        let edges: Vec<Edge> = graph
            .into_iter()
            .filter(|&(_, w)| w > 0.0 && max_weight / w <= epochs)
            .map(|((head, tail), w)| {
                let epochs_per_sample = max_weight / w;
                let epochs_per_negative_sample = epochs_per_sample / NEGATIVE_SAMPLE_RATE as f64;
                Edge {
                    head,
                    tail,
                    epochs_per_sample,
                    next_sample: epochs_per_sample,
                    epochs_per_negative_sample,
                    next_negative_sample: epochs_per_negative_sample,
                }
            })
            .collect();

        let (a, b) = fit_curve(config.spread, config.min_dist);

        let mut rng = seeded_rng(config.seed);
        let embedding = (0..n)
            .map(|_| {
                [
                    rng.gen_range(-INIT_RANGE..INIT_RANGE),
                    rng.gen_range(-INIT_RANGE..INIT_RANGE),
                ]
            })
            .collect();

        debug!(
            "UMAP prepared: {} points, k={}, {} edges, a={:.4}, b={:.4}",
            n,
            k,
            edges.len(),
            a,
            b
        );

        Self {
            edges,
            a,
            b,
            embedding,
            rng,
            epoch: 0,
            config,
        }
    }

    /// One pass over the edges due in epoch `n` (1-based).
    fn optimize_epoch(&mut self, n: f64) {
        let alpha = LEARNING_RATE * (1.0 - (n - 1.0) / self.config.iterations as f64);
        let (a, b) = (self.a, self.b);
        let n_vertices = self.embedding.len();

        for e in 0..self.edges.len() {
            if self.edges[e].next_sample > n {
                continue;
            }
            let (j, k) = (self.edges[e].head, self.edges[e].tail);

            let mut current = self.embedding[j];
            let mut other = self.embedding[k];
            let dist2 = squared(current, other);
            let attract = if dist2 > 0.0 {
                -2.0 * a * b * dist2.powf(b - 1.0) / (a * dist2.powf(b) + 1.0)
            } else {
                0.0
            };
            for d in 0..2 {
                let grad = clip(attract * (current[d] - other[d]));
                current[d] += grad * alpha;
                other[d] -= grad * alpha;
            }
            self.embedding[k] = other;

            let edge = &mut self.edges[e];
            edge.next_sample += edge.epochs_per_sample;
            let n_negative =
                ((n - edge.next_negative_sample) / edge.epochs_per_negative_sample).floor();
            let n_negative = if n_negative > 0.0 { n_negative as usize } else { 0 };
            edge.next_negative_sample += n_negative as f64 * edge.epochs_per_negative_sample;

            for _ in 0..n_negative {
                let sample = self.rng.gen_range(0..n_vertices);
                if sample == j {
                    continue;
                }
                let other = self.embedding[sample];
                let dist2 = squared(current, other);
                let repel = if dist2 > 0.0 {
                    2.0 * REPULSION_STRENGTH * b / ((0.001 + dist2) * (a * dist2.powf(b) + 1.0))
                } else {
                    0.0
                };
                for d in 0..2 {
                    let grad = if repel > 0.0 {
                        clip(repel * (current[d] - other[d]))
                    } else {
                        GRADIENT_CLIP
                    };
                    current[d] += grad * alpha;
                }
            }

            self.embedding[j] = current;
        }
    }
}

impl IterativeReducer for Umap {
    fn step(&mut self) -> Step<'_> {
        if self.epoch < self.config.iterations {
            self.epoch += 1;
            self.optimize_epoch(self.epoch as f64);
        }

        Step {
            embedding: &self.embedding,
            is_final: self.epoch >= self.config.iterations,
        }
    }

    fn iteration(&self) -> usize {
        self.epoch
    }

    fn total_iterations(&self) -> usize {
        self.config.iterations
    }
}

fn squared(p: [f64; 2], q: [f64; 2]) -> f64 {
    (p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)
}

fn clip(v: f64) -> f64 {
    v.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

/// Fuzzy simplicial set of the k-nearest-neighbour graph, symmetrised with
/// the probabilistic union `w + wᵀ - w ∘ wᵀ`. Both directions of each edge
/// are present.
fn fuzzy_graph(matrix: &Matrix, k: usize, metric: Metric) -> BTreeMap<(usize, usize), f64> {
    let distances = pairwise(matrix, metric);
    let n = distances.len();
    let mean_distance = {
        let total: f64 = distances.iter().flatten().sum();
        total / (n * n) as f64
    };

    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (i, row) in distances.iter().enumerate() {
        let mut neighbors: Vec<(usize, f64)> = row
            .iter()
            .copied()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .collect();
        neighbors.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
        neighbors.truncate(k);

        let (rho, sigma) = smooth_knn(&neighbors, k, mean_distance);
        for (j, d) in neighbors {
            let weight = if d - rho <= 0.0 {
                1.0
            } else {
                (-(d - rho) / sigma).exp()
            };
            directed.insert((i, j), weight);
        }
    }

    let mut graph = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let transpose = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let union = w + transpose - w * transpose;
        graph.insert((i, j), union);
        graph.insert((j, i), union);
    }
    graph
}

/// Distance to the nearest neighbour (`rho`) and the kernel bandwidth
/// (`sigma`) at which the neighbour weights sum to `log2(k)`.
fn smooth_knn(neighbors: &[(usize, f64)], k: usize, mean_distance: f64) -> (f64, f64) {
    let target = (k as f64).log2();
    let rho = neighbors
        .iter()
        .map(|&(_, d)| d)
        .find(|&d| d > 0.0)
        .unwrap_or(0.0);

    let mut lo = 0.0f64;
    let mut hi = f64::INFINITY;
    let mut mid = 1.0f64;
    for _ in 0..MAX_BANDWIDTH_STEPS {
        let psum: f64 = neighbors
            .iter()
            .map(|&(_, d)| {
                let shifted = d - rho;
                if shifted > 0.0 {
                    (-shifted / mid).exp()
                } else {
                    1.0
                }
            })
            .sum();

        if (psum - target).abs() < BANDWIDTH_TOLERANCE {
            break;
        }
        if psum > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_infinite() {
                mid * 2.0
            } else {
                (lo + hi) / 2.0
            };
        }
    }

    let floor = if rho > 0.0 {
        let mean_ith = neighbors.iter().map(|&(_, d)| d).sum::<f64>() / neighbors.len() as f64;
        MIN_K_DIST_SCALE * mean_ith
    } else {
        MIN_K_DIST_SCALE * mean_distance
    };

    (rho, mid.max(floor).max(f64::MIN_POSITIVE))
}

/// Fit `1 / (1 + a·x^(2b))` to the target membership curve defined by
/// `spread` and `min_dist`, using damped Gauss-Newton from `a = b = 1`.
pub(crate) fn fit_curve(spread: f64, min_dist: f64) -> (f64, f64) {
    let xs: Vec<f64> = (0..CURVE_SAMPLES)
        .map(|i| 3.0 * spread * i as f64 / (CURVE_SAMPLES - 1) as f64)
        .collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();

    let cost = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| {
                let r = 1.0 / (1.0 + a * x.powf(2.0 * b)) - y;
                r * r
            })
            .sum()
    };

    let (mut a, mut b) = (1.0f64, 1.0f64);
    let mut current = cost(a, b);
    let mut lambda = 1e-3f64;

    for _ in 0..200 {
        // Normal equations of the linearised residuals
        let (mut jaa, mut jab, mut jbb, mut ga, mut gb) = (0.0f64, 0.0f64, 0.0f64, 0.0f64, 0.0f64);
        for (&x, &y) in xs.iter().zip(&ys) {
            if x <= 0.0 {
                continue;
            }
            let u = x.powf(2.0 * b);
            let g = 1.0 / (1.0 + a * u);
            let r = g - y;
            let da = -u * g * g;
            let db = -a * u * 2.0 * x.ln() * g * g;
            jaa += da * da;
            jab += da * db;
            jbb += db * db;
            ga += da * r;
            gb += db * r;
        }

        let m00 = jaa * (1.0 + lambda);
        let m11 = jbb * (1.0 + lambda);
        let det = m00 * m11 - jab * jab;
        if det.abs() < f64::MIN_POSITIVE {
            break;
        }
        let step_a = -(m11 * ga - jab * gb) / det;
        let step_b = -(m00 * gb - jab * ga) / det;

        let (na, nb) = (a + step_a, b + step_b);
        if na > 0.0 && nb > 0.0 {
            let candidate = cost(na, nb);
            if candidate < current {
                a = na;
                b = nb;
                current = candidate;
                lambda = (lambda * 0.1).max(1e-12);
                if step_a.abs() < 1e-10 && step_b.abs() < 1e-10 {
                    break;
                }
                continue;
            }
        }
        lambda *= 10.0;
        if lambda > 1e12 {
            break;
        }
    }

    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Matrix {
        let mut rows = Vec::new();
        for i in 0..15 {
            let t = i as f64 * 0.05;
            rows.push(vec![t, 0.0, t * 0.5, 0.0]);
        }
        for i in 0..15 {
            let t = i as f64 * 0.05;
            rows.push(vec![20.0 + t, 20.0, t * 0.5, 20.0]);
        }
        Matrix::from_rows(rows).unwrap()
    }

    fn run(umap: &mut Umap) -> Vec<[f64; 2]> {
        loop {
            let step = umap.step();
            if step.is_final {
                return step.embedding.to_vec();
            }
        }
    }

    #[test]
    fn curve_fit_matches_reference_parameters() {
        // Reference values for spread=1.0, min_dist=0.1
        let (a, b) = fit_curve(1.0, 0.1);
        assert!((a - 1.577).abs() < 0.05, "a = {}", a);
        assert!((b - 0.895).abs() < 0.05, "b = {}", b);
    }

    #[test]
    fn fuzzy_graph_is_symmetric_with_unit_bounded_weights() {
        let graph = fuzzy_graph(&blobs(), 5, Metric::Euclidean);
        assert!(!graph.is_empty());
        for (&(i, j), &w) in &graph {
            assert!(w > 0.0 && w <= 1.0, "weight {} out of range", w);
            assert_eq!(graph.get(&(j, i)), Some(&w));
            assert_ne!(i, j);
        }
    }

    #[test]
    fn nearest_neighbour_has_full_membership() {
        let neighbors = vec![(1, 0.5), (2, 1.0), (3, 2.0)];
        let (rho, sigma) = smooth_knn(&neighbors, 3, 1.0);
        assert_eq!(rho, 0.5);
        assert!(sigma > 0.0);

        let psum: f64 = neighbors
            .iter()
            .map(|&(_, d)| if d - rho <= 0.0 { 1.0 } else { (-(d - rho) / sigma).exp() })
            .sum();
        assert!((psum - 3f64.log2()).abs() < 1e-3, "psum {}", psum);
    }

    #[test]
    fn runs_exactly_the_configured_epochs() {
        let mut umap = Umap::new(
            &blobs(),
            UmapConfig {
                iterations: 40,
                seed: Some(11),
                ..UmapConfig::default()
            },
        );
        let mut steps = 0;
        while !umap.step().is_final {
            steps += 1;
        }
        assert_eq!(steps + 1, 40);
        assert_eq!(umap.iteration(), umap.total_iterations());
    }

    /// Share of points whose nearest embedded neighbour comes from the same
    /// input cluster (indices below `split` form the first cluster).
    fn neighbour_agreement(out: &[[f64; 2]], split: usize) -> f64 {
        let hits = (0..out.len())
            .filter(|&i| {
                (0..out.len())
                    .filter(|&j| j != i)
                    .min_by(|&x, &y| squared(out[i], out[x]).total_cmp(&squared(out[i], out[y])))
                    .map_or(false, |j| (j < split) == (i < split))
            })
            .count();
        hits as f64 / out.len() as f64
    }

    #[test]
    fn keeps_clusters_apart() {
        let mut umap = Umap::new(
            &blobs(),
            UmapConfig {
                n_neighbors: 5,
                iterations: 200,
                seed: Some(5),
                ..UmapConfig::default()
            },
        );
        let out = run(&mut umap);
        assert_eq!(out.len(), 30);
        assert!(out.iter().all(|p| p[0].is_finite() && p[1].is_finite()));

        let agreement = neighbour_agreement(&out, 15);
        assert!(agreement >= 0.9, "neighbour agreement {}", agreement);
    }

    #[test]
    fn same_seed_reproduces_layout() {
        let config = UmapConfig {
            iterations: 30,
            seed: Some(99),
            ..UmapConfig::default()
        };
        let a = run(&mut Umap::new(&blobs(), config.clone()));
        let b = run(&mut Umap::new(&blobs(), config));
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_points_stay_finite() {
        let matrix = Matrix::from_rows(vec![vec![1.0, 1.0]; 4]).unwrap();
        let out = run(&mut Umap::new(
            &matrix,
            UmapConfig {
                iterations: 20,
                seed: Some(2),
                ..UmapConfig::default()
            },
        ));
        assert!(out.iter().all(|p| p[0].is_finite() && p[1].is_finite()));
    }
}
