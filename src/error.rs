//! Error types returned by segmentation.

use std::{
    error::Error,
    fmt::{self, Display},
};

use image::ImageError;

/// A parameter supplied to segmentation is out of its valid range or not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidParameter {
    /// The requested number of clusters is not within `min..=max`.
    ///
    /// `max` takes into account the number of samples being clustered,
    /// since there must be strictly more samples than clusters.
    ClusterCount {
        /// The requested number of clusters.
        k: u32,
        /// The smallest allowed number of clusters.
        min: u32,
        /// The largest allowed number of clusters.
        max: u32,
    },
    /// The clustering method name is not one of the supported methods.
    UnknownMethod(String),
    /// The linkage criterion name is not one of the supported criteria.
    UnknownLinkage(String),
    /// The maximum number of pixels for hierarchical clustering must be positive.
    MaxPixels(u32),
    /// The input image has no pixels.
    EmptyImage,
}

impl Display for InvalidParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidParameter::ClusterCount { k, min, max } if min > max => write!(
                f,
                "cannot form {k} clusters: not enough pixels (at least {} are required)",
                k + 1
            ),
            InvalidParameter::ClusterCount { k, min, max } => {
                write!(f, "number of clusters {k} is outside of the range {min}..={max}")
            }
            InvalidParameter::UnknownMethod(name) => write!(
                f,
                "unsupported method {name:?} (expected one of kmeans, gmm, hierarchical)"
            ),
            InvalidParameter::UnknownLinkage(name) => write!(
                f,
                "unsupported linkage {name:?} (expected one of ward, complete, average, single)"
            ),
            InvalidParameter::MaxPixels(max) => {
                write!(f, "the maximum number of pixels must be positive, got {max}")
            }
            InvalidParameter::EmptyImage => write!(f, "the image has no pixels"),
        }
    }
}

impl Error for InvalidParameter {}

/// The error type for all fallible segmentation stages.
///
/// The [`Display`] output names the stage that failed.
/// No partial output is ever produced alongside an error.
#[derive(Debug)]
pub enum SegmentError {
    /// A parameter was out of range or unrecognized. Checked before any clustering happens.
    InvalidParameter(InvalidParameter),
    /// The input image could not be decoded.
    Decode(ImageError),
    /// The output image could not be encoded.
    Encode(ImageError),
    /// The clustering method needs more memory than allowed or available.
    ResourceExhaustion {
        /// The name of the clustering method.
        method: &'static str,
        /// The number of samples (feature rows) that were to be clustered.
        samples: usize,
        /// The number of bytes that would be needed.
        bytes: u64,
        /// The configured limit in bytes.
        limit: u64,
    },
    /// The clustering method could not produce a result for this input.
    Clustering {
        /// The name of the clustering method.
        method: &'static str,
        /// A description of what went wrong.
        reason: &'static str,
    },
    /// A pixel was assigned a label outside of `0..k`.
    ///
    /// This indicates a broken [`ClusterAssigner`](crate::assign::ClusterAssigner) implementation.
    LabelOutOfRange {
        /// The row-major index of the pixel.
        pixel: usize,
        /// The offending label.
        label: u8,
        /// The number of clusters.
        k: u16,
    },
    /// A clustering method returned centroids, but not one per cluster.
    ///
    /// This indicates a broken [`ClusterAssigner`](crate::assign::ClusterAssigner) implementation.
    CentroidCount {
        /// The number of clusters.
        k: u16,
        /// The number of centroids returned.
        actual: usize,
    },
    /// The number of labels does not match the number of pixels.
    ShapeMismatch {
        /// The number of pixels in the image.
        expected: usize,
        /// The number of labels provided.
        actual: usize,
    },
}

impl Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::InvalidParameter(err) => write!(f, "invalid parameter: {err}"),
            SegmentError::Decode(err) => write!(f, "failed to decode image: {err}"),
            SegmentError::Encode(err) => write!(f, "failed to encode image: {err}"),
            SegmentError::ResourceExhaustion { method, samples, bytes, limit } => write!(
                f,
                "{method} clustering of {samples} samples needs {bytes} bytes, which exceeds the limit of {limit} bytes",
            ),
            SegmentError::Clustering { method, reason } => {
                write!(f, "{method} clustering failed: {reason}")
            }
            SegmentError::LabelOutOfRange { pixel, label, k } => write!(
                f,
                "color resolution failed: pixel {pixel} has label {label}, but there are only {k} clusters"
            ),
            SegmentError::CentroidCount { k, actual } => write!(
                f,
                "color resolution failed: expected {k} centroids (one per cluster), got {actual}"
            ),
            SegmentError::ShapeMismatch { expected, actual } => write!(
                f,
                "rendering failed: expected {expected} labels (one per pixel), got {actual}"
            ),
        }
    }
}

impl Error for SegmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SegmentError::InvalidParameter(err) => Some(err),
            SegmentError::Decode(err) | SegmentError::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InvalidParameter> for SegmentError {
    fn from(err: InvalidParameter) -> Self {
        SegmentError::InvalidParameter(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_stage() {
        let err = SegmentError::from(InvalidParameter::ClusterCount { k: 300, min: 2, max: 256 });
        assert_eq!(
            err.to_string(),
            "invalid parameter: number of clusters 300 is outside of the range 2..=256"
        );
        assert!(err.source().is_some());

        let err = SegmentError::LabelOutOfRange { pixel: 3, label: 9, k: 4 };
        assert!(err.to_string().starts_with("color resolution failed"));
        assert!(err.source().is_none());

        let err = SegmentError::CentroidCount { k: 2, actual: 1 };
        assert_eq!(
            err.to_string(),
            "color resolution failed: expected 2 centroids (one per cluster), got 1"
        );
    }

    #[test]
    fn too_few_pixels_message() {
        let err = InvalidParameter::ClusterCount { k: 2, min: 2, max: 1 };
        assert_eq!(
            err.to_string(),
            "cannot form 2 clusters: not enough pixels (at least 3 are required)"
        );
    }
}
