//! The clustering backends that assign a cluster label to each feature vector.
//!
//! Each backend is exposed as a module with an `assign` function,
//! and all of them are unified behind the [`ClusterAssigner`] trait,
//! which is what the segmentation pipeline is generic over.
//! [`Method`](crate::Method) implements [`ClusterAssigner`] by dispatching to one of the backends.

pub mod gmm;
pub mod hierarchical;
pub mod kmeans;

use crate::{ClusterCount, SegmentError};

/// The result of clustering a set of feature vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment<const N: usize> {
    /// The cluster label of each feature vector, in the same order as the input.
    ///
    /// Each label must be less than the requested number of clusters.
    /// Not every label in `0..k` needs to be present.
    pub labels: Vec<u8>,
    /// A representative point for each cluster, if the method computes one.
    ///
    /// When present, there must be exactly `k` centroids and
    /// the first three components of each centroid must be the cluster's color.
    pub centroids: Option<Vec<[f32; N]>>,
}

/// A clustering method that can be plugged into the segmentation pipeline.
pub trait ClusterAssigner {
    /// A short name for the method, used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Clusters `features` into `k` clusters.
    ///
    /// Implementors may assume that `features.len()` is greater than `k`,
    /// and that it does not exceed [`max_samples`](ClusterAssigner::max_samples).
    ///
    /// # Errors
    /// Returns an error if the method cannot cluster the input
    /// (e.g., it would need too much memory).
    fn assign<const N: usize>(
        &self,
        features: &[[f32; N]],
        k: ClusterCount,
    ) -> Result<Assignment<N>, SegmentError>;

    /// The maximum number of feature vectors this method accepts, if any.
    ///
    /// Images with more pixels than this are downsampled before clustering.
    fn max_samples(&self) -> Option<u32> {
        None
    }
}

impl<T: ClusterAssigner + ?Sized> ClusterAssigner for &T {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn assign<const N: usize>(
        &self,
        features: &[[f32; N]],
        k: ClusterCount,
    ) -> Result<Assignment<N>, SegmentError> {
        (**self).assign(features, k)
    }

    fn max_samples(&self) -> Option<u32> {
        (**self).max_samples()
    }
}

/// Returns the squared euclidean distance between two points.
#[inline]
pub(crate) fn squared_euclidean_distance<const N: usize>(x: [f32; N], y: [f32; N]) -> f32 {
    let mut dist = 0.0;
    for c in 0..N {
        let d = x[c] - y[c];
        dist += d * d;
    }
    dist
}

/// Returns the mean of the per-component variances of the given points.
pub(crate) fn mean_variance<const N: usize>(points: &[[f32; N]]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let mut sum = [0.0f64; N];
    let mut sum_squared = [0.0f64; N];
    for point in points {
        for c in 0..N {
            let v = f64::from(point[c]);
            sum[c] += v;
            sum_squared[c] += v * v;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let variance = (0..N)
        .map(|c| {
            let mean = sum[c] / n;
            (sum_squared[c] / n - mean * mean).max(0.0)
        })
        .sum::<f64>()
        / N as f64;

    variance
}
