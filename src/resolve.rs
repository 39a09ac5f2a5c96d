//! Computing the representative color of each cluster.

use crate::{ClusterCount, SegmentError};

use palette::Srgb;

/// The representative color and pixel count of each cluster, indexed by label.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTable {
    /// The color of each cluster with components in `0.0..=1.0`.
    pub colors: Vec<Srgb<f32>>,
    /// The number of pixels assigned to each cluster.
    pub counts: Vec<u32>,
}

impl ColorTable {
    /// The number of clusters in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Whether the table has no clusters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Returns the colors of the table as 8-bit colors, see [`to_u8`].
    #[must_use]
    pub fn palette(&self) -> Vec<Srgb<u8>> {
        self.colors.iter().copied().map(to_u8).collect()
    }
}

/// Converts a color with components in `0.0..=1.0` to 8-bit components.
///
/// Components are clipped to `0.0..=1.0`, scaled by `255`, and truncated toward zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_u8(color: Srgb<f32>) -> Srgb<u8> {
    let [r, g, b] = [color.red, color.green, color.blue].map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8);
    Srgb::new(r, g, b)
}

/// Checks that every label is less than `k`.
///
/// # Errors
/// Returns [`SegmentError::LabelOutOfRange`] for the first offending label.
pub fn check_labels(labels: &[u8], k: ClusterCount) -> Result<(), SegmentError> {
    match labels
        .iter()
        .position(|&label| usize::from(label) >= k.as_usize())
    {
        Some(pixel) => Err(SegmentError::LabelOutOfRange {
            pixel,
            label: labels[pixel],
            k: k.into_inner(),
        }),
        None => Ok(()),
    }
}

/// Compile time check that features of width `N` start with the three color components.
struct ColorComponents<const N: usize>;

impl<const N: usize> ColorComponents<N> {
    const CHECK: () = assert!(N >= 3, "features must start with the three color components");
}

/// Counts the number of pixels with each label.
fn counts(labels: &[u8], k: ClusterCount) -> Vec<u32> {
    let mut counts = vec![0; k.as_usize()];
    for &label in labels {
        counts[usize::from(label)] += 1;
    }
    counts
}

/// Determines the color of each of the `k` clusters.
///
/// If the clustering method provided `centroids`, the color of a cluster is
/// the first three components of its centroid, clipped to `0.0..=1.0`.
/// Otherwise, it is the mean of the normalized colors of the pixels with that label.
/// A cluster without any pixels falls back to black.
///
/// `pixels` and `labels` must be in the same (row-major) order.
///
/// # Errors
/// Returns [`SegmentError::ShapeMismatch`] if `labels` and `pixels` differ in length,
/// [`SegmentError::LabelOutOfRange`] if a label is not less than `k`,
/// or [`SegmentError::CentroidCount`] if `centroids` does not have exactly `k` entries.
pub fn resolve<const N: usize>(
    pixels: &[Srgb<u8>],
    labels: &[u8],
    k: ClusterCount,
    centroids: Option<&[[f32; N]]>,
) -> Result<ColorTable, SegmentError> {
    if pixels.len() != labels.len() {
        return Err(SegmentError::ShapeMismatch {
            expected: pixels.len(),
            actual: labels.len(),
        });
    }
    check_labels(labels, k)?;
    if let Some(centroids) = centroids {
        if centroids.len() != k.as_usize() {
            return Err(SegmentError::CentroidCount {
                k: k.into_inner(),
                actual: centroids.len(),
            });
        }
    }
    let () = ColorComponents::<N>::CHECK;

    let counts = counts(labels, k);

    let colors = match centroids {
        Some(centroids) => centroids
            .iter()
            .zip(&counts)
            .map(|(centroid, &count)| {
                if count == 0 {
                    Srgb::new(0.0, 0.0, 0.0)
                } else {
                    let [r, g, b] = [centroid[0], centroid[1], centroid[2]].map(|c| c.clamp(0.0, 1.0));
                    Srgb::new(r, g, b)
                }
            })
            .collect(),
        None => {
            let mut sums = vec![[0.0f64; 3]; k.as_usize()];
            for (&label, color) in labels.iter().zip(pixels) {
                let sum = &mut sums[usize::from(label)];
                sum[0] += f64::from(color.red);
                sum[1] += f64::from(color.green);
                sum[2] += f64::from(color.blue);
            }

            sums.iter()
                .zip(&counts)
                .map(|(sum, &count)| {
                    if count == 0 {
                        Srgb::new(0.0, 0.0, 0.0)
                    } else {
                        let n = f64::from(count) * 255.0;
                        #[allow(clippy::cast_possible_truncation)]
                        let [r, g, b] = sum.map(|s| (s / n) as f32);
                        Srgb::new(r, g, b)
                    }
                })
                .collect()
        }
    };

    Ok(ColorTable { colors, counts })
}
