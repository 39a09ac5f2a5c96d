#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use image::{Rgb, RgbImage};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoroshiro128PlusPlus;

pub fn load_images(images: &[PathBuf]) -> Vec<(String, RgbImage)> {
    images
        .iter()
        .map(|path| {
            image::open(path).map(|image| {
                (
                    path.file_name().unwrap().to_owned().into_string().unwrap(),
                    image.into_rgb8(),
                )
            })
        })
        .collect::<Result<_, _>>()
        .expect("loaded each image")
}

pub fn load_image_dir(dir: impl AsRef<Path>) -> Vec<(String, RgbImage)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut paths = entries
        .collect::<Result<Vec<_>, _>>()
        .expect("read each file")
        .iter()
        .map(std::fs::DirEntry::path)
        .collect::<Vec<_>>();

    paths.sort();

    load_images(&paths)
}

/// Smooth color gradients split into a few blocks with noise, loosely resembling a photo.
pub fn synthetic_image(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
    let blocks: [[u8; 3]; 6] = std::array::from_fn(|_| rng.gen());

    RgbImage::from_fn(width, height, |x, y| {
        let block = (3 * x / width.max(1) + 3 * (2 * y / height.max(1))) as usize;
        let [r, g, b] = blocks[block.min(5)];
        let shade = (x + y) % 32;
        Rgb([
            r.saturating_add(rng.gen_range(0..8)).wrapping_add(shade as u8),
            g.saturating_add(rng.gen_range(0..8)),
            b.saturating_sub(rng.gen_range(0..8)),
        ])
    })
}

pub const BENCH_DIR: &str = "img/bench";

/// Images from `BENCH_DIR` if present, otherwise a set of generated images.
pub fn bench_images() -> &'static [(String, RgbImage)] {
    static IMAGES: OnceLock<Vec<(String, RgbImage)>> = OnceLock::new();
    IMAGES.get_or_init(|| {
        let images = load_image_dir(BENCH_DIR);
        if images.is_empty() {
            [(64, 64), (160, 120), (320, 240)]
                .into_iter()
                .enumerate()
                .map(|(seed, (width, height))| {
                    (format!("{width}x{height}"), synthetic_image(width, height, seed as u64))
                })
                .collect()
        } else {
            images
        }
    })
}
