//! K-means clustering with k-means++ seeding and Lloyd iterations.
//!
//! The seeding uses the greedy variant of k-means++, which draws several candidate centers
//! at each step and keeps the one that reduces the total potential the most:
//!
//! Arthur, D. & Vassilvitskii, S. k-means++: The Advantages of Careful Seeding.
//! Proceedings of the Eighteenth Annual ACM-SIAM Symposium on Discrete Algorithms, 1027–1035, 2007.

use super::{mean_variance, squared_euclidean_distance, Assignment};
use crate::{ClusterCount, SegmentError};

use std::array;

use log::debug;
use rand::{prelude::Distribution, Rng, SeedableRng};
use rand_distr::Uniform;
use rand_xoshiro::Xoroshiro128PlusPlus;
use wide::{f32x8, u32x8, CmpLt};

/// The default maximum number of Lloyd iterations.
pub const DEFAULT_MAX_ITERATIONS: u32 = 300;

/// The default convergence tolerance, relative to the mean variance of the input.
pub const DEFAULT_TOLERANCE: f32 = 1e-4;

/// Centroids laid out in chunks of 8 for SIMD nearest neighbor search.
struct CentroidTable<const N: usize> {
    /// Each chunk holds component `i` of 8 centroids in `chunk[i]`.
    /// The unused lanes of the last chunk are filled with infinity.
    chunks: Vec<[f32x8; N]>,
}

impl<const N: usize> CentroidTable<N> {
    fn new(centroids: &[[f32; N]]) -> Self {
        let mut chunks_out = Vec::with_capacity(centroids.len().div_ceil(8));
        let chunks = centroids.chunks_exact(8);
        chunks_out.extend(
            chunks
                .clone()
                .map(|chunk| array::from_fn(|i| f32x8::new(array::from_fn(|j| chunk[j][i])))),
        );

        if !chunks.remainder().is_empty() {
            let mut arr = [[f32::INFINITY; 8]; N];
            for (i, centroid) in chunks.remainder().iter().enumerate() {
                for (arr, &c) in arr.iter_mut().zip(centroid) {
                    arr[i] = c;
                }
            }
            chunks_out.push(arr.map(f32x8::new));
        }

        Self { chunks: chunks_out }
    }

    /// Returns the index of the centroid nearest to `query`.
    /// Ties are broken in favor of the lowest index.
    #[inline]
    #[allow(clippy::float_cmp)]
    fn nearest(&self, query: [f32; N]) -> u8 {
        let incr = u32x8::ONE;
        let mut cur_chunk = u32x8::ZERO;
        let mut min_chunk = cur_chunk;
        let mut min_distance = f32x8::splat(f32::INFINITY);

        let query = query.map(f32x8::splat);

        for chunk in &self.chunks {
            let mut distance = f32x8::splat(0.0);
            for i in 0..N {
                let diff = query[i] - chunk[i];
                distance += diff * diff;
            }

            #[allow(unsafe_code)]
            let mask: u32x8 = unsafe { std::mem::transmute(distance.cmp_lt(min_distance)) };
            min_chunk = mask.blend(cur_chunk, min_chunk);
            min_distance = min_distance.fast_min(distance);
            cur_chunk += incr;
        }

        let mut min_index = u32::MAX;
        let mut min_dist = f32::INFINITY;
        for (lane, (&dist, &chunk)) in min_distance
            .as_array_ref()
            .iter()
            .zip(min_chunk.as_array_ref())
            .enumerate()
        {
            #[allow(clippy::cast_possible_truncation)]
            let index = chunk * 8 + lane as u32;
            if dist < min_dist || (dist == min_dist && index < min_index) {
                min_dist = dist;
                min_index = index;
            }
        }

        // there are at most 256 centroids
        #[allow(clippy::cast_possible_truncation)]
        let min_index = min_index as u8;
        min_index
    }
}

/// Assigns each point to its nearest centroid, returning whether any label changed.
fn assign_labels<const N: usize>(
    points: &[[f32; N]],
    table: &CentroidTable<N>,
    labels: &mut [u8],
) -> bool {
    let mut changed = false;
    for (label, &point) in labels.iter_mut().zip(points) {
        let nearest = table.nearest(point);
        changed |= nearest != *label;
        *label = nearest;
    }
    changed
}

/// Computes the distance from each point to `center`, lowered to the current closest distance.
fn closest_distances<const N: usize>(
    points: &[[f32; N]],
    closest: &[f64],
    center: [f32; N],
    out: &mut Vec<f64>,
) -> f64 {
    out.clear();
    out.extend(
        points
            .iter()
            .zip(closest)
            .map(|(&point, &d)| d.min(f64::from(squared_euclidean_distance(point, center)))),
    );
    out.iter().sum()
}

/// Chooses `k` initial centroids from `points` using greedy k-means++.
fn plus_plus<const N: usize>(
    points: &[[f32; N]],
    k: usize,
    rng: &mut Xoroshiro128PlusPlus,
) -> Vec<[f32; N]> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let trials = 2 + (k as f64).ln() as usize;

    let first = points[Uniform::new(0, points.len()).sample(rng)];
    let mut centroids = Vec::with_capacity(k);
    centroids.push(first);

    let mut closest = points
        .iter()
        .map(|&point| f64::from(squared_euclidean_distance(point, first)))
        .collect::<Vec<_>>();
    let mut potential = closest.iter().sum::<f64>();

    let mut cumulative = Vec::with_capacity(points.len());
    let mut best = Vec::with_capacity(points.len());
    let mut trial = Vec::with_capacity(points.len());

    for _ in 1..k {
        cumulative.clear();
        cumulative.extend(closest.iter().scan(0.0, |sum, &d| {
            *sum += d;
            Some(*sum)
        }));

        let sample = |rng: &mut Xoroshiro128PlusPlus| {
            let r = rng.gen::<f64>() * potential;
            cumulative.partition_point(|&c| c < r).min(points.len() - 1)
        };

        let mut best_candidate = sample(rng);
        let mut best_potential =
            closest_distances(points, &closest, points[best_candidate], &mut best);

        for _ in 1..trials {
            let candidate = sample(rng);
            let trial_potential = closest_distances(points, &closest, points[candidate], &mut trial);
            if trial_potential < best_potential {
                best_candidate = candidate;
                best_potential = trial_potential;
                std::mem::swap(&mut best, &mut trial);
            }
        }

        centroids.push(points[best_candidate]);
        std::mem::swap(&mut closest, &mut best);
        potential = best_potential;
    }

    centroids
}

/// Runs Lloyd iterations starting from `centroids`.
///
/// Clusters that lose all of their points keep their previous centroid.
fn lloyd<const N: usize>(
    points: &[[f32; N]],
    centroids: &mut [[f32; N]],
    max_iterations: u32,
    tolerance: f64,
) -> Vec<u8> {
    let k = centroids.len();
    let mut labels = vec![0; points.len()];
    let mut sums = vec![[0.0f64; N]; k];
    let mut counts = vec![0u32; k];

    for iteration in 0..max_iterations {
        let changed = assign_labels(points, &CentroidTable::new(centroids), &mut labels);
        if !changed && iteration > 0 {
            debug!("k-means converged after {iteration} iterations (labels unchanged)");
            return labels;
        }

        sums.fill([0.0; N]);
        counts.fill(0);
        for (&label, point) in labels.iter().zip(points) {
            let i = usize::from(label);
            counts[i] += 1;
            for c in 0..N {
                sums[i][c] += f64::from(point[c]);
            }
        }

        let mut shift = 0.0;
        for ((centroid, sum), &count) in centroids.iter_mut().zip(&sums).zip(&counts) {
            if count > 0 {
                let n = f64::from(count);
                #[allow(clippy::cast_possible_truncation)]
                let new = sum.map(|s| (s / n) as f32);
                shift += f64::from(squared_euclidean_distance(*centroid, new));
                *centroid = new;
            }
        }

        if shift <= tolerance {
            debug!("k-means converged after {} iterations (center shift {shift:e})", iteration + 1);
            break;
        }
    }

    // make the labels agree with the final centroids
    assign_labels(points, &CentroidTable::new(centroids), &mut labels);
    labels
}

/// Clusters `points` into `k` clusters using k-means.
///
/// `tolerance` is relative to the mean per-component variance of `points`:
/// iteration stops once the total squared movement of the centroids falls below it.
/// The same `seed` always produces the same result for the same input.
///
/// The returned [`Assignment`] contains the final centroids.
///
/// # Errors
/// Returns [`SegmentError::InvalidParameter`] if there are not more points than clusters.
pub fn assign<const N: usize>(
    points: &[[f32; N]],
    k: ClusterCount,
    max_iterations: u32,
    tolerance: f32,
    seed: u64,
) -> Result<Assignment<N>, SegmentError> {
    k.check_samples(points.len())?;

    let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
    let mut centroids = plus_plus(points, k.as_usize(), rng);
    let tolerance = f64::from(tolerance) * mean_variance(points);
    let labels = lloyd(points, &mut centroids, max_iterations, tolerance);

    Ok(Assignment { labels, centroids: Some(centroids) })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{features::color_features, tests::*};
    use ordered_float::OrderedFloat;

    fn k(k: u16) -> ClusterCount {
        ClusterCount::try_from(k).unwrap()
    }

    fn run<const N: usize>(points: &[[f32; N]], clusters: u16, seed: u64) -> Assignment<N> {
        assign(points, k(clusters), DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE, seed).unwrap()
    }

    #[test]
    fn naive_nearest_neighbor_oracle() {
        let centroids = color_features(&random_image(249, 1, 5)); // non-multiple of 8
        let points = color_features(&random_image(32, 32, 6));
        let table = CentroidTable::new(&centroids);

        for &point in &points {
            let expected = centroids
                .iter()
                .map(|&c| OrderedFloat(squared_euclidean_distance(c, point)))
                .min()
                .unwrap()
                .0;

            let actual = squared_euclidean_distance(
                centroids[usize::from(table.nearest(point))],
                point,
            );

            #[allow(clippy::float_cmp)]
            {
                assert_eq!(expected, actual);
            }
        }
    }

    #[test]
    fn nearest_prefers_lowest_index_on_ties() {
        let mut centroids = vec![[0.5f32; 3]; 20];
        centroids[3] = [0.0; 3];
        centroids[11] = [0.0; 3];
        let table = CentroidTable::new(&centroids);
        assert_eq!(table.nearest([0.0; 3]), 3);
        assert_eq!(table.nearest([0.5; 3]), 0);
    }

    #[test]
    fn rejects_too_many_clusters() {
        let points = [[0.0f32; 3]; 4];
        assert!(matches!(
            assign(&points, k(4), 10, 1e-4, 0),
            Err(SegmentError::InvalidParameter(_))
        ));
        assert!(assign(&points, k(3), 10, 1e-4, 0).is_ok());
    }

    #[test]
    fn identical_points() {
        let points = color_features(&solid_image(2, 2, RED));
        let result = run(&points, 2, 42);
        assert_eq!(result.labels, vec![0; 4]);
        assert_eq!(result.centroids.unwrap()[0], [1.0, 0.0, 0.0]);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn separates_two_groups() {
        let points = color_features(&red_blue_row(4));
        let result = run(&points, 2, 42);

        let labels = result.labels;
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);

        let centroids = result.centroids.unwrap();
        assert_eq!(centroids[usize::from(labels[0])], [1.0, 0.0, 0.0]);
        assert_eq!(centroids[usize::from(labels[2])], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn finds_quadrants() {
        let image = noisy_quadrants(16, 16);
        let points = color_features(&image);
        let labels = run(&points, 4, 1).labels;

        // every quadrant has a single label, and the quadrants are all different
        let label_at = |x: usize, y: usize| labels[y * 16 + x];
        let mut quadrant_labels = Vec::new();
        for (qx, qy) in [(0, 0), (8, 0), (0, 8), (8, 8)] {
            let label = label_at(qx, qy);
            for y in qy..qy + 8 {
                for x in qx..qx + 8 {
                    assert_eq!(label_at(x, y), label);
                }
            }
            quadrant_labels.push(label);
        }
        quadrant_labels.sort_unstable();
        quadrant_labels.dedup();
        assert_eq!(quadrant_labels.len(), 4);
    }

    #[test]
    fn same_seed_same_result() {
        let points = color_features(&random_image(20, 20, 9));
        let a = run(&points, 7, 3);
        let b = run(&points, 7, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn labels_match_centroids() {
        let points = color_features(&random_image(20, 20, 10));
        let result = assign(&points, k(5), 2, 0.0, 0).unwrap();
        let table = CentroidTable::new(result.centroids.as_ref().unwrap());
        for (&label, &point) in result.labels.iter().zip(&points) {
            assert_eq!(label, table.nearest(point));
        }
    }
}
