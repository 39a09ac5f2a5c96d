//! Producing the segmented output image from labels and cluster colors.

use crate::{resolve::ColorTable, SegmentError};

use image::RgbImage;
use palette::{cast::IntoComponents, Srgb};

/// Paints every pixel with the 8-bit color of its cluster.
///
/// `labels` are in row-major order, so label `i` is written to pixel
/// `(i % width, i / width)`. Colors are converted with [`to_u8`](crate::resolve::to_u8).
///
/// # Errors
/// Returns [`SegmentError::ShapeMismatch`] if there is not exactly one label per pixel,
/// or [`SegmentError::LabelOutOfRange`] if a label has no color in `table`.
pub fn render(
    labels: &[u8],
    table: &ColorTable,
    width: u32,
    height: u32,
) -> Result<RgbImage, SegmentError> {
    render_with_palette(labels, &table.palette(), width, height)
}

/// Same as [`render`], but with an already converted palette.
///
/// # Errors
/// See [`render`].
pub fn render_with_palette(
    labels: &[u8],
    palette: &[Srgb<u8>],
    width: u32,
    height: u32,
) -> Result<RgbImage, SegmentError> {
    let expected = width as usize * height as usize;
    if labels.len() != expected {
        return Err(SegmentError::ShapeMismatch { expected, actual: labels.len() });
    }

    let k = u16::try_from(palette.len()).unwrap_or(u16::MAX);
    let buf = labels
        .iter()
        .enumerate()
        .map(|(pixel, &label)| {
            palette
                .get(usize::from(label))
                .copied()
                .ok_or(SegmentError::LabelOutOfRange { pixel, label, k })
        })
        .collect::<Result<Vec<_>, _>>()?
        .into_components();

    #[allow(clippy::expect_used)]
    {
        // labels.len() is equal to width * height,
        // so buf is exactly large enough by construction
        Ok(RgbImage::from_vec(width, height, buf).expect("large enough buffer"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    fn table(colors: &[[f32; 3]]) -> ColorTable {
        ColorTable {
            colors: colors.iter().map(|&[r, g, b]| Srgb::new(r, g, b)).collect(),
            counts: vec![0; colors.len()],
        }
    }

    #[test]
    fn places_labels_in_row_major_order() {
        let (width, height) = (3, 2);
        let labels = [0, 1, 2, 2, 1, 0];
        let table = table(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let image = render(&labels, &table, width, height).unwrap();

        assert_eq!(image.dimensions(), (width, height));
        let colors = [Rgb([255, 0, 0]), Rgb([0, 255, 0]), Rgb([0, 0, 255])];
        for (i, &label) in labels.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let (x, y) = (i as u32 % width, i as u32 / width);
            assert_eq!(*image.get_pixel(x, y), colors[usize::from(label)]);
        }
    }

    #[test]
    fn colors_are_truncated() {
        let table = table(&[[0.5, 0.999, 0.0021], [0.3, 0.6, 0.9]]);
        let image = render(&[1, 0], &table, 1, 2).unwrap();
        assert_eq!(*image.get_pixel(0, 0), Rgb([76, 153, 229]));
        assert_eq!(*image.get_pixel(0, 1), Rgb([127, 254, 0]));
    }

    #[test]
    fn rejects_wrong_shapes() {
        let table = table(&[[0.0; 3], [1.0; 3]]);
        assert!(matches!(
            render(&[0, 1, 0], &table, 2, 2),
            Err(SegmentError::ShapeMismatch { expected: 4, actual: 3 })
        ));
        assert!(matches!(
            render(&[0, 1, 3, 0], &table, 2, 2),
            Err(SegmentError::LabelOutOfRange { pixel: 2, label: 3, k: 2 })
        ));
    }
}
