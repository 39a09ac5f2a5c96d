//! Contains the builder structs for the supported clustering methods.

use crate::assign::{gmm, hierarchical, hierarchical::Linkage, kmeans};

/// A builder struct to specify the parameters for k-means.
///
/// # Examples
/// ```
/// # use clusterseg::KmeansOptions;
/// let options = KmeansOptions::new()
///     .max_iterations(100)
///     .seed(7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmeansOptions {
    /// The seed value for the random number generator.
    pub(crate) seed: u64,
    /// The maximum number of Lloyd iterations.
    pub(crate) max_iterations: u32,
    /// The convergence tolerance, relative to the mean variance of the features.
    pub(crate) tolerance: f32,
}

impl Default for KmeansOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl KmeansOptions {
    /// Creates a new [`KmeansOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            seed: 42,
            max_iterations: kmeans::DEFAULT_MAX_ITERATIONS,
            tolerance: kmeans::DEFAULT_TOLERANCE,
        }
    }

    /// Sets the seed value for the random number generator.
    ///
    /// The default seed is `42`.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the maximum number of iterations.
    ///
    /// The default is [`kmeans::DEFAULT_MAX_ITERATIONS`].
    #[must_use]
    pub const fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the convergence tolerance.
    ///
    /// Iteration stops once the total squared movement of the centroids is below
    /// this value times the mean per-feature variance.
    ///
    /// The default is [`kmeans::DEFAULT_TOLERANCE`].
    #[must_use]
    pub const fn tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// A builder struct to specify the parameters for Gaussian mixtures.
///
/// # Examples
/// ```
/// # use clusterseg::GmmOptions;
/// let options = GmmOptions::new()
///     .reg_covar(1e-4)
///     .seed(7);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GmmOptions {
    /// The seed value for the k-means initialization.
    pub(crate) seed: u64,
    /// The maximum number of EM iterations.
    pub(crate) max_iterations: u32,
    /// The convergence threshold on the mean log-likelihood.
    pub(crate) tolerance: f64,
    /// The regularization added to the covariance diagonals.
    pub(crate) reg_covar: f64,
}

impl Default for GmmOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl GmmOptions {
    /// Creates a new [`GmmOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            seed: 42,
            max_iterations: gmm::DEFAULT_MAX_ITERATIONS,
            tolerance: gmm::DEFAULT_TOLERANCE,
            reg_covar: gmm::DEFAULT_REG_COVAR,
        }
    }

    /// Sets the seed value for the random number generator used to initialize the mixture.
    ///
    /// The default seed is `42`.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the maximum number of EM iterations.
    ///
    /// The default is [`gmm::DEFAULT_MAX_ITERATIONS`].
    #[must_use]
    pub const fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the convergence threshold on the change of the mean log-likelihood.
    ///
    /// The default is [`gmm::DEFAULT_TOLERANCE`].
    #[must_use]
    pub const fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the non-negative regularization added to the diagonal of each covariance matrix.
    ///
    /// The default is [`gmm::DEFAULT_REG_COVAR`].
    #[must_use]
    pub const fn reg_covar(mut self, reg_covar: f64) -> Self {
        self.reg_covar = reg_covar;
        self
    }
}

/// A builder struct to specify the parameters for hierarchical clustering.
///
/// # Examples
/// ```
/// # use clusterseg::{HierarchicalOptions, Linkage};
/// let options = HierarchicalOptions::new()
///     .linkage(Linkage::Complete)
///     .max_pixels(10_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchicalOptions {
    /// The linkage criterion.
    pub(crate) linkage: Linkage,
    /// The maximum number of pixels to cluster.
    pub(crate) max_pixels: u32,
    /// The maximum size of the pairwise distance matrix in bytes.
    pub(crate) max_matrix_bytes: u64,
}

impl Default for HierarchicalOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchicalOptions {
    /// The default maximum number of pixels to cluster.
    pub const DEFAULT_MAX_PIXELS: u32 = 40_000;

    /// Creates a new [`HierarchicalOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            linkage: Linkage::Ward,
            max_pixels: Self::DEFAULT_MAX_PIXELS,
            max_matrix_bytes: hierarchical::DEFAULT_MAX_MATRIX_BYTES,
        }
    }

    /// Sets the linkage criterion.
    ///
    /// The default is [`Linkage::Ward`].
    #[must_use]
    pub const fn linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    /// Sets the maximum number of pixels to cluster.
    ///
    /// Images with more pixels are downsampled before clustering.
    /// This must be positive, otherwise segmentation fails with
    /// [`InvalidParameter::MaxPixels`](crate::InvalidParameter::MaxPixels).
    ///
    /// The default is [`HierarchicalOptions::DEFAULT_MAX_PIXELS`].
    #[must_use]
    pub const fn max_pixels(mut self, max_pixels: u32) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    /// Sets the maximum size in bytes of the pairwise distance matrix
    /// used by the complete and average linkages.
    ///
    /// The matrix takes `2 * n * (n - 1)` bytes for `n` pixels, so the default of
    /// [`hierarchical::DEFAULT_MAX_MATRIX_BYTES`] (1 GiB) admits up to 23,170 pixels.
    /// Larger inputs fail with [`SegmentError::ResourceExhaustion`](crate::SegmentError::ResourceExhaustion)
    /// unless [`HierarchicalOptions::max_pixels`] downsamples them below that bound.
    #[must_use]
    pub const fn max_matrix_bytes(mut self, max_matrix_bytes: u64) -> Self {
        self.max_matrix_bytes = max_matrix_bytes;
        self
    }
}
