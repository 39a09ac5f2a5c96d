//! Contains the types and functions for the high level segmentation API.

mod method;
mod pipeline;

pub use method::{GmmOptions, HierarchicalOptions, KmeansOptions};
pub use pipeline::{segment, segment_dynamic, segment_output, DownsamplePolicy, SegmentOptions};

pub use crate::assign::hierarchical::Linkage;

use crate::{
    assign::{gmm, hierarchical, kmeans, Assignment, ClusterAssigner},
    ClusterCount, InvalidParameter, SegmentError,
};

use std::{fmt, str::FromStr};

/// The set of supported clustering methods.
///
/// See the descriptions on each enum variant for more information.
/// Any other [`ClusterAssigner`] can also be used through [`SegmentOptions::assigner`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
    /// K-means clustering.
    ///
    /// This method is fast and gives compact clusters of similar size.
    ///
    /// See the [`kmeans`](crate::assign::kmeans) module for more details.
    Kmeans(KmeansOptions),
    /// Gaussian mixture clustering with full covariance matrices.
    ///
    /// This method is slower than k-means but allows elongated clusters
    /// and clusters of different spread.
    ///
    /// See the [`gmm`](crate::assign::gmm) module for more details.
    GaussianMixture(GmmOptions),
    /// Agglomerative hierarchical clustering.
    ///
    /// This method is quadratic in the number of pixels,
    /// so larger images are downsampled to [`HierarchicalOptions::max_pixels`] first.
    ///
    /// See the [`hierarchical`](crate::assign::hierarchical) module for more details.
    Hierarchical(HierarchicalOptions),
}

impl Method {
    /// The names accepted by [`FromStr`], in the order of the enum variants.
    pub const NAMES: [&'static str; 3] = ["kmeans", "gmm", "hierarchical"];

    /// Creates a new [`Method::Kmeans`] with default options.
    #[must_use]
    pub const fn kmeans() -> Self {
        Self::Kmeans(KmeansOptions::new())
    }

    /// Creates a new [`Method::GaussianMixture`] with default options.
    #[must_use]
    pub const fn gmm() -> Self {
        Self::GaussianMixture(GmmOptions::new())
    }

    /// Creates a new [`Method::Hierarchical`] with default options.
    #[must_use]
    pub const fn hierarchical() -> Self {
        Self::Hierarchical(HierarchicalOptions::new())
    }

    /// The name of the method, as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Method::Kmeans(_) => Self::NAMES[0],
            Method::GaussianMixture(_) => Self::NAMES[1],
            Method::Hierarchical(_) => Self::NAMES[2],
        }
    }
}

impl Default for Method {
    fn default() -> Self {
        Self::kmeans()
    }
}

impl From<KmeansOptions> for Method {
    fn from(options: KmeansOptions) -> Self {
        Self::Kmeans(options)
    }
}

impl From<GmmOptions> for Method {
    fn from(options: GmmOptions) -> Self {
        Self::GaussianMixture(options)
    }
}

impl From<HierarchicalOptions> for Method {
    fn from(options: HierarchicalOptions) -> Self {
        Self::Hierarchical(options)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = InvalidParameter;

    /// Parses a method name into a [`Method`] with default options.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::kmeans(), Self::gmm(), Self::hierarchical()]
            .into_iter()
            .find(|method| method.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| InvalidParameter::UnknownMethod(s.to_owned()))
    }
}

impl ClusterAssigner for Method {
    fn name(&self) -> &'static str {
        Method::name(self)
    }

    fn assign<const N: usize>(
        &self,
        features: &[[f32; N]],
        k: ClusterCount,
    ) -> Result<Assignment<N>, SegmentError> {
        match *self {
            Method::Kmeans(KmeansOptions { seed, max_iterations, tolerance }) => {
                kmeans::assign(features, k, max_iterations, tolerance, seed)
            }
            Method::GaussianMixture(GmmOptions { seed, max_iterations, tolerance, reg_covar }) => {
                gmm::assign(features, k, max_iterations, tolerance, reg_covar, seed)
            }
            Method::Hierarchical(HierarchicalOptions { linkage, max_matrix_bytes, .. }) => {
                hierarchical::assign(features, k, linkage, max_matrix_bytes)
            }
        }
    }

    fn max_samples(&self) -> Option<u32> {
        match self {
            Method::Hierarchical(options) => Some(options.max_pixels),
            Method::Kmeans(_) | Method::GaussianMixture(_) => None,
        }
    }
}
