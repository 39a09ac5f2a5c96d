//! Contains various types needed across the crate.

use crate::{InvalidParameter, MAX_CLUSTERS, MIN_CLUSTERS};
use image::RgbImage;
use palette::Srgb;
use std::fmt::Display;

/// This type is used to specify the number of clusters (`k`) to segment an image into.
///
/// This is a simple new type wrapper around `u16` with the invariant that it must be
/// in the range [`MIN_CLUSTERS`]`..=`[`MAX_CLUSTERS`].
/// Note that clustering additionally requires `k` to be less than the number of pixels,
/// which can only be checked once the image is known.
///
/// # Examples
/// Use `try_into`/`try_from` or [`ClusterCount::from_clamped`] to create [`ClusterCount`]s:
/// ```
/// # use clusterseg::{ClusterCount, InvalidParameter};
/// # fn main() -> Result<(), InvalidParameter> {
/// let k = ClusterCount::try_from(6u16)?;
/// let k: ClusterCount = 6u16.try_into()?;
/// let k = ClusterCount::from_clamped(1024);
/// assert_eq!(k, ClusterCount::MAX);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClusterCount(u16);

impl ClusterCount {
    /// The smallest supported number of clusters (given by [`MIN_CLUSTERS`]).
    pub const MIN: Self = Self(MIN_CLUSTERS);

    /// The largest supported number of clusters (given by [`MAX_CLUSTERS`]).
    pub const MAX: Self = Self(MAX_CLUSTERS);

    /// Gets the inner `u16` value.
    #[must_use]
    pub const fn into_inner(self) -> u16 {
        self.0
    }

    /// Gets the inner value as a `usize` for indexing and lengths.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Creates a [`ClusterCount`] by clamping the given `u16` to the supported range.
    #[must_use]
    pub const fn from_clamped(value: u16) -> Self {
        if value < MIN_CLUSTERS {
            Self::MIN
        } else if value > MAX_CLUSTERS {
            Self::MAX
        } else {
            Self(value)
        }
    }

    /// Checks that there are strictly more samples than clusters.
    pub(crate) fn check_samples(self, samples: usize) -> Result<(), InvalidParameter> {
        if samples > self.as_usize() {
            Ok(())
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let max = samples.saturating_sub(1).min(MAX_CLUSTERS.into()) as u32;
            Err(InvalidParameter::ClusterCount {
                k: self.0.into(),
                min: MIN_CLUSTERS.into(),
                max,
            })
        }
    }
}

impl Default for ClusterCount {
    /// The default number of clusters is `6`.
    fn default() -> Self {
        Self(6)
    }
}

impl From<ClusterCount> for u16 {
    fn from(val: ClusterCount) -> Self {
        val.into_inner()
    }
}

impl TryFrom<u16> for ClusterCount {
    type Error = InvalidParameter;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if (MIN_CLUSTERS..=MAX_CLUSTERS).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidParameter::ClusterCount {
                k: value.into(),
                min: MIN_CLUSTERS.into(),
                max: MAX_CLUSTERS.into(),
            })
        }
    }
}

impl TryFrom<u32> for ClusterCount {
    type Error = InvalidParameter;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u16::try_from(value)
            .ok()
            .and_then(|k| Self::try_from(k).ok())
            .ok_or(InvalidParameter::ClusterCount {
                k: value,
                min: MIN_CLUSTERS.into(),
                max: MAX_CLUSTERS.into(),
            })
    }
}

impl Display for ClusterCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_inner())
    }
}

/// The output struct returned by [`segment_output`](crate::segment_output).
///
/// Alongside the segmented `image`, it contains the color `palette` used for each cluster,
/// the number of pixels assigned to each cluster in `counts`,
/// and the cluster label of each pixel in `labels` (in row-major order).
///
/// If the image was downsampled before clustering, `labels` and `counts` refer to the
/// downsampled image, and `image` has the downsampled dimensions unless
/// [`DownsamplePolicy::Restore`](crate::DownsamplePolicy::Restore) was used.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentOutput {
    /// The segmented image.
    pub image: RgbImage,
    /// The color of each cluster, indexed by label.
    ///
    /// Clusters without any pixels are black.
    pub palette: Vec<Srgb<u8>>,
    /// The number of pixels assigned to each cluster, indexed by label.
    ///
    /// Counts may be zero.
    pub counts: Vec<u32>,
    /// The cluster label of each clustered pixel.
    pub labels: Vec<u8>,
    /// The `(width, height)` that clustering was performed at,
    /// or `None` if the image was clustered at its original size.
    pub downsampled: Option<(u32, u32)>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cluster_count_range() {
        assert!(ClusterCount::try_from(0u16).is_err());
        assert!(ClusterCount::try_from(1u16).is_err());
        assert_eq!(ClusterCount::try_from(2u16), Ok(ClusterCount::MIN));
        assert_eq!(ClusterCount::try_from(256u16), Ok(ClusterCount::MAX));
        assert!(ClusterCount::try_from(257u16).is_err());
        assert!(ClusterCount::try_from(70_000u32).is_err());
        assert_eq!(ClusterCount::from_clamped(0), ClusterCount::MIN);
        assert_eq!(ClusterCount::default().into_inner(), 6);
    }

    #[test]
    fn more_samples_than_clusters() {
        let k = ClusterCount::try_from(4u16).unwrap();
        assert!(k.check_samples(5).is_ok());
        assert_eq!(
            k.check_samples(4),
            Err(InvalidParameter::ClusterCount { k: 4, min: 2, max: 3 })
        );
        assert_eq!(
            k.check_samples(0),
            Err(InvalidParameter::ClusterCount { k: 4, min: 2, max: 0 })
        );
    }
}
