//! The segmentation pipeline: feature extraction, clustering, color resolution, and rendering.

use super::Method;
use crate::{
    assign::{Assignment, ClusterAssigner},
    features::{self, Features},
    render, resolve, ClusterCount, InvalidParameter, SegmentError, SegmentOutput,
};

use image::{
    imageops::{self, FilterType},
    DynamicImage, RgbImage,
};
use log::debug;
use palette::Srgb;

/// What to do with the output resolution when an image was downsampled before clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DownsamplePolicy {
    /// Keep the reduced resolution that clustering was performed at.
    #[default]
    Shrink,
    /// Upscale the segmented image back to the input size with nearest-neighbor sampling,
    /// which does not introduce any new colors.
    Restore,
}

/// A builder struct to specify the options for [`segment`] and [`segment_output`].
///
/// The type parameter is the clustering method, which is [`Method`] by default.
/// Any other [`ClusterAssigner`] can be supplied through [`SegmentOptions::assigner`].
///
/// # Examples
/// ```
/// # use clusterseg::{ClusterCount, DownsamplePolicy, GmmOptions, SegmentOptions};
/// # fn main() -> Result<(), clusterseg::InvalidParameter> {
/// let options = SegmentOptions::new()
///     .k(ClusterCount::try_from(4u16)?)
///     .include_position(false)
///     .method(GmmOptions::new().seed(1))
///     .downsample(DownsamplePolicy::Restore);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentOptions<A = Method> {
    /// The clustering method.
    assigner: A,
    /// The number of clusters.
    k: ClusterCount,
    /// Whether to append the normalized pixel position to each feature vector.
    include_position: bool,
    /// The output resolution policy for downsampled images.
    downsample: DownsamplePolicy,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentOptions {
    /// Creates a new [`SegmentOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_assigner(Method::kmeans())
    }

    /// Sets the clustering method.
    ///
    /// The default method is [`Method::Kmeans`].
    #[must_use]
    pub fn method(mut self, method: impl Into<Method>) -> Self {
        self.assigner = method.into();
        self
    }
}

impl<A> SegmentOptions<A> {
    /// Creates a new [`SegmentOptions`] with default values and the given clustering method.
    #[must_use]
    pub const fn with_assigner(assigner: A) -> Self {
        Self {
            assigner,
            k: ClusterCount::from_clamped(6),
            include_position: true,
            downsample: DownsamplePolicy::Shrink,
        }
    }

    /// Replaces the clustering method with any [`ClusterAssigner`].
    #[must_use]
    pub fn assigner<B>(self, assigner: B) -> SegmentOptions<B> {
        SegmentOptions {
            assigner,
            k: self.k,
            include_position: self.include_position,
            downsample: self.downsample,
        }
    }

    /// Sets the number of clusters.
    ///
    /// The default is `6`. Segmentation additionally requires
    /// the (possibly downsampled) image to have more pixels than clusters.
    #[must_use]
    pub const fn k(mut self, k: ClusterCount) -> Self {
        self.k = k;
        self
    }

    /// Sets whether to cluster on color and position instead of color alone.
    ///
    /// Including the position favors spatially coherent segments.
    ///
    /// The default is `true`.
    #[must_use]
    pub const fn include_position(mut self, include_position: bool) -> Self {
        self.include_position = include_position;
        self
    }

    /// Sets the output resolution policy for images that are downsampled before clustering.
    ///
    /// The default is [`DownsamplePolicy::Shrink`].
    #[must_use]
    pub const fn downsample(mut self, downsample: DownsamplePolicy) -> Self {
        self.downsample = downsample;
        self
    }
}

/// Returns the dimensions to downsample a `width` by `height` image to
/// so that it has at most `max_pixels` pixels, or `None` if it already does.
///
/// Both sides are scaled by the same factor and are at least `1`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub(crate) fn downsample_dimensions(width: u32, height: u32, max_pixels: u32) -> Option<(u32, u32)> {
    let pixels = u64::from(width) * u64::from(height);
    let max = u64::from(max_pixels.max(1));
    if pixels <= max {
        return None;
    }

    let scale = (max as f64 / pixels as f64).sqrt();
    let mut w = ((f64::from(width) * scale).floor() as u32).max(1);
    let mut h = ((f64::from(height) * scale).floor() as u32).max(1);

    // floating point error may leave the result just above the limit
    while u64::from(w) * u64::from(h) > max {
        if w >= h && w > 1 {
            w -= 1;
        } else {
            h -= 1;
        }
    }

    Some((w, h))
}

/// Clusters the features and resolves the cluster colors.
fn cluster<A: ClusterAssigner, const N: usize>(
    assigner: &A,
    features: &[[f32; N]],
    pixels: &[Srgb<u8>],
    k: ClusterCount,
) -> Result<(Vec<u8>, resolve::ColorTable), SegmentError> {
    let Assignment { labels, centroids } = assigner.assign(features, k)?;
    let table = resolve::resolve(pixels, &labels, k, centroids.as_deref())?;
    Ok((labels, table))
}

/// Segments an image, returning the segmented image together with
/// the cluster palette, pixel counts, and labels.
///
/// See [`segment`] for more details.
///
/// # Errors
/// See [`segment`].
pub fn segment_output<A: ClusterAssigner>(
    image: &RgbImage,
    options: &SegmentOptions<A>,
) -> Result<SegmentOutput, SegmentError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(InvalidParameter::EmptyImage.into());
    }

    let assigner = &options.assigner;
    let max_samples = assigner.max_samples();
    if max_samples == Some(0) {
        return Err(InvalidParameter::MaxPixels(0).into());
    }

    let downsampled = max_samples.and_then(|max| downsample_dimensions(width, height, max));
    let resized;
    let input = if let Some((w, h)) = downsampled {
        debug!(
            "downsampling {width}x{height} image to {w}x{h} for {} clustering",
            assigner.name()
        );
        resized = imageops::resize(image, w, h, FilterType::Triangle);
        &resized
    } else {
        image
    };

    let pixels = features::pixels(input);
    options.k.check_samples(pixels.len())?;

    let matrix = features::extract(input, options.include_position);
    debug!(
        "extracted {} features with {} dimensions",
        matrix.features.len(),
        matrix.features.dimensions()
    );

    let (labels, table) = match &matrix.features {
        Features::Color(features) => cluster(assigner, features, pixels, options.k)?,
        Features::ColorPosition(features) => cluster(assigner, features, pixels, options.k)?,
    };
    debug!(
        "{} clustering produced {} non-empty clusters",
        assigner.name(),
        table.counts.iter().filter(|&&count| count > 0).count()
    );

    let palette = table.palette();
    let mut segmented = render::render_with_palette(&labels, &palette, matrix.width, matrix.height)?;
    if downsampled.is_some() && options.downsample == DownsamplePolicy::Restore {
        segmented = imageops::resize(&segmented, width, height, FilterType::Nearest);
    }

    Ok(SegmentOutput {
        image: segmented,
        palette,
        counts: table.counts,
        labels,
        downsampled,
    })
}

/// Segments an image by clustering its pixels and replacing each pixel
/// with the representative color of its cluster.
///
/// The output has the same dimensions as `image`, unless the clustering method
/// requires downsampling (see [`DownsamplePolicy`]). It contains at most `k` distinct colors.
///
/// # Errors
/// Returns [`SegmentError::InvalidParameter`] if the image is empty,
/// if `k` is not less than the number of (possibly downsampled) pixels,
/// or if the method's maximum number of pixels is zero.
/// Any error from the clustering method is returned unchanged,
/// and no partial output is produced.
pub fn segment<A: ClusterAssigner>(
    image: &RgbImage,
    options: &SegmentOptions<A>,
) -> Result<RgbImage, SegmentError> {
    segment_output(image, options).map(|output| output.image)
}

/// Same as [`segment`], but first converts an image of any channel layout and depth
/// to 8-bit RGB, dropping any alpha channel.
///
/// # Errors
/// See [`segment`].
pub fn segment_dynamic<A: ClusterAssigner>(
    image: &DynamicImage,
    options: &SegmentOptions<A>,
) -> Result<RgbImage, SegmentError> {
    segment(&image.to_rgb8(), options)
}
