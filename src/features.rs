//! Conversion of images into per-pixel feature vectors.
//!
//! Feature vectors are laid out in row-major pixel order:
//! all pixels of the first row from left to right, then the second row, and so on.
//! The same order is used for labels and is relied upon by [`render`](crate::render)
//! to put each color back in its place.

use image::RgbImage;
use palette::{cast::ComponentsAs, Srgb};

/// The number of dimensions of a color-only feature vector.
pub const COLOR_DIMENSIONS: usize = 3;

/// The number of dimensions of a color and position feature vector.
pub const COLOR_POSITION_DIMENSIONS: usize = 5;

/// The feature vectors of every pixel of an image.
#[derive(Debug, Clone, PartialEq)]
pub enum Features {
    /// Normalized `[r, g, b]` with each component in `0.0..=1.0`.
    Color(Vec<[f32; COLOR_DIMENSIONS]>),
    /// Normalized `[r, g, b, x, y]` with each component in `0.0..=1.0`.
    ColorPosition(Vec<[f32; COLOR_POSITION_DIMENSIONS]>),
}

impl Features {
    /// The number of feature vectors (i.e., pixels).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Features::Color(features) => features.len(),
            Features::ColorPosition(features) => features.len(),
        }
    }

    /// Whether there are no feature vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of dimensions of each feature vector.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        match self {
            Features::Color(_) => COLOR_DIMENSIONS,
            Features::ColorPosition(_) => COLOR_POSITION_DIMENSIONS,
        }
    }
}

/// The feature matrix of an image together with the image's dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    /// The feature vectors in row-major order.
    pub features: Features,
    /// The width of the image.
    pub width: u32,
    /// The height of the image.
    pub height: u32,
}

/// Returns the pixels of an image as a flat slice of colors in row-major order.
#[must_use]
pub fn pixels(image: &RgbImage) -> &[Srgb<u8>] {
    let len = image.width() as usize * image.height() as usize;
    image.as_raw()[..(len * 3)].components_as()
}

/// Normalizes an 8-bit color to `0.0..=1.0` components.
#[inline]
fn normalize(color: Srgb<u8>) -> [f32; 3] {
    [color.red, color.green, color.blue].map(|c| f32::from(c) / 255.0)
}

/// Computes color-only features: each channel divided by `255`.
#[must_use]
pub fn color_features(image: &RgbImage) -> Vec<[f32; COLOR_DIMENSIONS]> {
    pixels(image).iter().copied().map(normalize).collect()
}

/// Computes color and position features.
///
/// The `x` and `y` coordinates are each divided by the extent of their own axis minus one,
/// so the corners of the image map to `0.0` and `1.0` on both axes regardless of aspect ratio.
/// An axis of length `1` uses a divisor of `1`, so all of its positions are `0.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn color_position_features(image: &RgbImage) -> Vec<[f32; COLOR_POSITION_DIMENSIONS]> {
    let (width, height) = image.dimensions();
    let x_scale = width.saturating_sub(1).max(1) as f32;
    let y_scale = height.saturating_sub(1).max(1) as f32;
    let colors = pixels(image);

    let mut features = Vec::with_capacity(colors.len());
    for (row, y) in colors.chunks_exact(width.max(1) as usize).zip(0..height) {
        let y = y as f32 / y_scale;
        features.extend(row.iter().zip(0..width).map(|(&color, x)| {
            let [r, g, b] = normalize(color);
            [r, g, b, x as f32 / x_scale, y]
        }));
    }
    features
}

/// Converts an image into a feature matrix,
/// optionally appending the normalized pixel position to each color.
#[must_use]
pub fn extract(image: &RgbImage, include_position: bool) -> FeatureMatrix {
    let features = if include_position {
        Features::ColorPosition(color_position_features(image))
    } else {
        Features::Color(color_features(image))
    };

    FeatureMatrix {
        features,
        width: image.width(),
        height: image.height(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tests::*;
    use image::Rgb;

    #[test]
    fn empty_image() {
        let image = RgbImage::new(0, 0);
        assert!(extract(&image, false).features.is_empty());
        assert!(extract(&image, true).features.is_empty());

        let image = RgbImage::new(0, 5);
        assert!(color_position_features(&image).is_empty());
    }

    #[test]
    fn colors_are_normalized() {
        let image = RgbImage::from_vec(2, 1, vec![0, 51, 255, 255, 102, 0]).unwrap();
        assert_eq!(
            color_features(&image),
            vec![[0.0, 0.2, 1.0], [1.0, 0.4, 0.0]]
        );
    }

    #[test]
    fn feature_dimensions() {
        let image = random_image(5, 4, 1);

        let matrix = extract(&image, false);
        assert_eq!((matrix.width, matrix.height), (5, 4));
        assert_eq!(matrix.features.len(), 20);
        assert_eq!(matrix.features.dimensions(), 3);

        let matrix = extract(&image, true);
        assert_eq!(matrix.features.len(), 20);
        assert_eq!(matrix.features.dimensions(), 5);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn positions_are_within_bounds() {
        for (width, height) in [(7, 3), (3, 7), (1, 6), (6, 1), (1, 1), (2, 2)] {
            let image = random_image(width, height, 3);
            let features = color_position_features(&image);

            for feature in &features {
                for component in feature {
                    assert!((0.0..=1.0).contains(component));
                }
            }

            let at = |x: u32, y: u32| {
                let [_, _, _, fx, fy] = features[(y * width + x) as usize];
                [fx, fy]
            };

            let x_max = if width > 1 { 1.0 } else { 0.0 };
            let y_max = if height > 1 { 1.0 } else { 0.0 };
            assert_eq!(at(0, 0), [0.0, 0.0]);
            assert_eq!(at(width - 1, 0), [x_max, 0.0]);
            assert_eq!(at(0, height - 1), [0.0, y_max]);
            assert_eq!(at(width - 1, height - 1), [x_max, y_max]);
        }
    }

    #[test]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn row_major_order() {
        // tag each pixel with its row-major index, spread over the red and green channels
        let (width, height) = (13, 9);
        let image = RgbImage::from_fn(width, height, |x, y| {
            let i = y * width + x;
            Rgb([(i % 256) as u8, (i / 256) as u8, 0])
        });

        let features = color_position_features(&image);
        for (i, &[r, g, _, x, y]) in features.iter().enumerate() {
            let tag = (r * 255.0).round() as usize + 256 * (g * 255.0).round() as usize;
            assert_eq!(tag, i);

            let col = (x * (width - 1) as f32).round() as usize;
            let row = (y * (height - 1) as f32).round() as usize;
            assert_eq!(row * width as usize + col, i);
        }

        let colors = color_features(&image);
        for (i, &[r, g, _]) in colors.iter().enumerate() {
            let tag = (r * 255.0).round() as usize + 256 * (g * 255.0).round() as usize;
            assert_eq!(tag, i);
        }
    }
}
