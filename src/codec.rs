//! Decoding input images and encoding segmented images.
//!
//! Which formats can be decoded depends on the enabled `image` format features
//! (`png` and `jpeg` by default). Every decoded image is converted to 8-bit RGB,
//! dropping any alpha channel.

use crate::SegmentError;

use std::path::Path;

use image::RgbImage;
#[cfg(feature = "png")]
use {image::ImageFormat, std::io::Cursor};

/// Decodes an image from bytes in any supported format, guessing the format from its contents.
///
/// # Errors
/// Returns [`SegmentError::Decode`] if the bytes are not a supported or valid image.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, SegmentError> {
    image::load_from_memory(bytes)
        .map(image::DynamicImage::into_rgb8)
        .map_err(SegmentError::Decode)
}

/// Opens and decodes the image file at `path`.
///
/// # Errors
/// Returns [`SegmentError::Decode`] if the file cannot be read
/// or is not a supported or valid image.
pub fn open(path: impl AsRef<Path>) -> Result<RgbImage, SegmentError> {
    image::open(path)
        .map(image::DynamicImage::into_rgb8)
        .map_err(SegmentError::Decode)
}

/// Encodes an image as PNG.
///
/// # Errors
/// Returns [`SegmentError::Encode`] if encoding fails.
#[cfg(feature = "png")]
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, SegmentError> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(SegmentError::Encode)?;
    Ok(bytes.into_inner())
}
