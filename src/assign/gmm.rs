//! Gaussian mixture clustering with full covariance matrices, fit by expectation-maximization.
//!
//! The mixture is initialized from a k-means clustering of the input with the same seed,
//! so the result is deterministic for a given seed.
//! Each pixel is labeled with the component of highest posterior probability.

use super::{kmeans, Assignment};
use crate::{ClusterCount, SegmentError};

use std::f64::consts::TAU;

use log::{debug, warn};

/// The default maximum number of EM iterations.
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

/// The default convergence threshold on the change in the mean log-likelihood.
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// The default non-negative regularization added to the diagonal of each covariance matrix.
pub const DEFAULT_REG_COVAR: f64 = 1e-6;

/// The method name used in errors and logs.
const NAME: &str = "gaussian mixture";

/// A single Gaussian component of the mixture.
#[derive(Debug, Clone)]
struct Component<const N: usize> {
    /// The log of the mixture weight.
    log_weight: f64,
    /// The mean of the component.
    mean: [f64; N],
    /// The lower triangular Cholesky factor of the covariance matrix.
    cholesky: [[f64; N]; N],
    /// Half the log determinant of the covariance matrix,
    /// which is the sum of the logs of the diagonal of `cholesky`.
    half_log_det: f64,
}

impl<const N: usize> Component<N> {
    /// The log probability density of `x` under this component (excluding the mixture weight).
    #[allow(clippy::cast_precision_loss)]
    fn log_density(&self, x: [f32; N]) -> f64 {
        // solve L z = x - mean by forward substitution, so that |z|^2 is the Mahalanobis distance
        let l = &self.cholesky;
        let mut z = [0.0; N];
        let mut distance = 0.0;
        for i in 0..N {
            let mut v = f64::from(x[i]) - self.mean[i];
            for p in 0..i {
                v -= l[i][p] * z[p];
            }
            z[i] = v / l[i][i];
            distance += z[i] * z[i];
        }

        -0.5 * (N as f64 * TAU.ln() + distance) - self.half_log_det
    }
}

/// Computes the Cholesky factorization of a symmetric matrix.
/// Returns `None` if the matrix is not positive definite.
fn cholesky<const N: usize>(a: &[[f64; N]; N]) -> Option<[[f64; N]; N]> {
    let mut l = [[0.0; N]; N];
    for i in 0..N {
        for j in 0..=i {
            let mut sum = a[i][j];
            for p in 0..j {
                sum -= l[i][p] * l[j][p];
            }

            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][i] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

/// Returns `ln(sum(exp(values)))`, computed stably.
#[allow(clippy::float_cmp)]
fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        max
    } else {
        max + values.iter().map(|&v| (v - max).exp()).sum::<f64>().ln()
    }
}

/// The error returned when a covariance matrix cannot be factorized.
fn ill_defined_covariance() -> SegmentError {
    SegmentError::Clustering {
        method: NAME,
        reason: "a component has an ill-defined covariance matrix (try fewer clusters or a larger covariance regularization)",
    }
}

/// Estimates the mixture parameters from the responsibilities (M-step).
///
/// `resp` holds `k` responsibilities per point, row-major.
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
fn maximization<const N: usize>(
    points: &[[f32; N]],
    resp: &[f64],
    k: usize,
    reg_covar: f64,
) -> Result<Vec<Component<N>>, SegmentError> {
    let n = points.len() as f64;

    (0..k)
        .map(|j| -> Result<Component<N>, SegmentError> {
            let weights = resp.iter().skip(j).step_by(k);

            let mut total = 10.0 * f64::EPSILON;
            let mut mean = [0.0; N];
            for (&r, point) in weights.clone().zip(points) {
                total += r;
                for c in 0..N {
                    mean[c] += r * f64::from(point[c]);
                }
            }
            mean = mean.map(|m| m / total);

            let mut covariance = [[0.0; N]; N];
            for (&r, point) in weights.zip(points) {
                if r == 0.0 {
                    continue;
                }
                let diff: [f64; N] = std::array::from_fn(|c| f64::from(point[c]) - mean[c]);
                for a in 0..N {
                    for b in 0..=a {
                        covariance[a][b] += r * diff[a] * diff[b];
                    }
                }
            }
            for a in 0..N {
                for b in 0..=a {
                    covariance[a][b] /= total;
                    covariance[b][a] = covariance[a][b];
                }
                covariance[a][a] += reg_covar;
            }

            let cholesky = cholesky(&covariance).ok_or_else(ill_defined_covariance)?;
            let half_log_det = (0..N).map(|i| cholesky[i][i].ln()).sum();

            Ok(Component {
                log_weight: (total / n).ln(),
                mean,
                cholesky,
                half_log_det,
            })
        })
        .collect()
}

/// Computes the log responsibilities for each point (E-step),
/// returning the mean log-likelihood of the points.
#[allow(clippy::cast_precision_loss)]
fn expectation<const N: usize>(
    points: &[[f32; N]],
    components: &[Component<N>],
    log_resp: &mut [f64],
) -> f64 {
    let mut total = 0.0;
    for (&point, row) in points.iter().zip(log_resp.chunks_exact_mut(components.len())) {
        for (value, component) in row.iter_mut().zip(components) {
            *value = component.log_weight + component.log_density(point);
        }
        let norm = log_sum_exp(row);
        for value in row.iter_mut() {
            *value -= norm;
        }
        total += norm;
    }
    total / points.len() as f64
}

/// Clusters `points` into `k` Gaussian components using expectation-maximization.
///
/// The mixture is initialized from k-means with the given `seed`.
/// `reg_covar` is added to the diagonal of every covariance matrix to keep them positive definite.
/// Iteration stops once the mean log-likelihood changes by less than `tolerance`,
/// or after `max_iterations` (with a logged warning).
///
/// The returned [`Assignment`] contains the component means as centroids.
///
/// # Errors
/// Returns [`SegmentError::InvalidParameter`] if there are not more points than clusters,
/// or [`SegmentError::Clustering`] if a covariance matrix is not positive definite
/// even after regularization.
pub fn assign<const N: usize>(
    points: &[[f32; N]],
    k: ClusterCount,
    max_iterations: u32,
    tolerance: f64,
    reg_covar: f64,
    seed: u64,
) -> Result<Assignment<N>, SegmentError> {
    let clusters = k;
    clusters.check_samples(points.len())?;
    let k = clusters.as_usize();

    let initial = kmeans::assign(
        points,
        clusters,
        kmeans::DEFAULT_MAX_ITERATIONS,
        kmeans::DEFAULT_TOLERANCE,
        seed,
    )?;

    let mut resp = vec![0.0; points.len() * k];
    for (row, &label) in resp.chunks_exact_mut(k).zip(&initial.labels) {
        row[usize::from(label)] = 1.0;
    }

    let mut components = maximization(points, &resp, k, reg_covar)?;

    let mut lower_bound = f64::NEG_INFINITY;
    let mut converged = false;
    for iteration in 1..=max_iterations {
        let previous = lower_bound;
        lower_bound = expectation(points, &components, &mut resp);
        for r in &mut resp {
            *r = r.exp();
        }
        components = maximization(points, &resp, k, reg_covar)?;

        if (lower_bound - previous).abs() < tolerance {
            debug!("gaussian mixture converged after {iteration} iterations (log-likelihood {lower_bound:.4})");
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(
            "gaussian mixture did not converge after {max_iterations} iterations; \
             try a larger tolerance or more iterations"
        );
    }

    // relabel with the final parameters so that the labels agree with the means
    expectation(points, &components, &mut resp);
    let labels = resp
        .chunks_exact(k)
        .map(|row| {
            let mut best = 0;
            for (j, &value) in row.iter().enumerate() {
                if value > row[best] {
                    best = j;
                }
            }
            #[allow(clippy::cast_possible_truncation)]
            let best = best as u8;
            best
        })
        .collect();

    #[allow(clippy::cast_possible_truncation)]
    let centroids = components
        .iter()
        .map(|component| component.mean.map(|m| m as f32))
        .collect();

    Ok(Assignment { labels, centroids: Some(centroids) })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{features::color_features, features::color_position_features, tests::*};

    fn run<const N: usize>(points: &[[f32; N]], k: u16, seed: u64) -> Assignment<N> {
        assign(
            points,
            ClusterCount::try_from(k).unwrap(),
            DEFAULT_MAX_ITERATIONS,
            DEFAULT_TOLERANCE,
            DEFAULT_REG_COVAR,
            seed,
        )
        .unwrap()
    }

    #[test]
    fn cholesky_of_known_matrix() {
        let a = [[4.0, 2.0, 0.4], [2.0, 5.0, 1.0], [0.4, 1.0, 3.0]];
        let l = cholesky(&a).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let product = (0..3).map(|p| l[i][p] * l[j][p]).sum::<f64>();
                assert!((product - a[i][j]).abs() < 1e-12);
            }
            for j in (i + 1)..3 {
                assert!(l[i][j].abs() < f64::EPSILON);
            }
        }

        assert!(cholesky(&[[1.0, 2.0], [2.0, 1.0]]).is_none());
    }

    #[test]
    fn log_density_of_standard_normal() {
        let component = Component::<2> {
            log_weight: 0.0,
            mean: [0.0; 2],
            cholesky: [[1.0, 0.0], [0.0, 1.0]],
            half_log_det: 0.0,
        };
        let expected = -TAU.ln();
        assert!((component.log_density([0.0, 0.0]) - expected).abs() < 1e-12);
        assert!((component.log_density([1.0, 0.0]) - (expected - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn log_sum_exp_is_stable() {
        assert!((log_sum_exp(&[1000.0, 1000.0]) - (1000.0 + 2f64.ln())).abs() < 1e-9);
        assert!(log_sum_exp(&[f64::NEG_INFINITY; 3]) == f64::NEG_INFINITY);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn separates_two_groups_exactly() {
        let points = color_features(&red_blue_row(4));
        let result = run(&points, 2, 42);

        let labels = result.labels;
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);

        let means = result.centroids.unwrap();
        assert_eq!(means[usize::from(labels[0])], [1.0, 0.0, 0.0]);
        assert_eq!(means[usize::from(labels[2])], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn finds_quadrants_with_position() {
        let points = color_position_features(&noisy_quadrants(12, 12));
        let labels = run(&points, 4, 42).labels;

        let mut quadrant_labels = [(0, 0), (6, 0), (0, 6), (6, 6)]
            .map(|(x, y)| labels[y * 12 + x])
            .to_vec();
        quadrant_labels.sort_unstable();
        quadrant_labels.dedup();
        assert_eq!(quadrant_labels.len(), 4);
    }

    #[test]
    fn same_seed_same_result() {
        let points = color_features(&random_image(12, 12, 4));
        assert_eq!(run(&points, 3, 5), run(&points, 3, 5));
    }

    #[test]
    fn labels_are_in_range() {
        let points = color_position_features(&random_image(10, 10, 8));
        let result = run(&points, 5, 0);
        assert_eq!(result.labels.len(), 100);
        assert!(result.labels.iter().all(|&label| label < 5));
        assert_eq!(result.centroids.unwrap().len(), 5);
    }
}
