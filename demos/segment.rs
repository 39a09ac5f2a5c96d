#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice
)]

use std::{error::Error, fmt::Display, path::PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use clusterseg::{
    codec, segment_output, ClusterCount, DownsamplePolicy, GmmOptions, HierarchicalOptions,
    KmeansOptions, Linkage, Method, SegmentOptions,
};

#[derive(Copy, Clone, ValueEnum)]
enum CliLinkage {
    Ward,
    Complete,
    Average,
    Single,
}

impl From<CliLinkage> for Linkage {
    fn from(value: CliLinkage) -> Self {
        match value {
            CliLinkage::Ward => Linkage::Ward,
            CliLinkage::Complete => Linkage::Complete,
            CliLinkage::Average => Linkage::Average,
            CliLinkage::Single => Linkage::Single,
        }
    }
}

impl Display for CliLinkage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Linkage::from(*self))
    }
}

#[derive(Subcommand)]
enum CliMethod {
    Kmeans {
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = clusterseg::assign::kmeans::DEFAULT_MAX_ITERATIONS)]
        max_iterations: u32,
    },
    Gmm {
        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = clusterseg::assign::gmm::DEFAULT_MAX_ITERATIONS)]
        max_iterations: u32,

        #[arg(long, default_value_t = clusterseg::assign::gmm::DEFAULT_REG_COVAR)]
        reg_covar: f64,
    },
    Hierarchical {
        #[arg(long, default_value_t = CliLinkage::Ward)]
        linkage: CliLinkage,

        #[arg(long, default_value_t = HierarchicalOptions::DEFAULT_MAX_PIXELS)]
        max_pixels: u32,

        /// Upscale the output back to the input size if the image was downsampled.
        #[arg(long)]
        restore: bool,
    },
}

#[derive(Parser)]
pub struct Options {
    #[arg(short, long, default_value_t = ClusterCount::default(), value_parser = parse_cluster_count)]
    k: ClusterCount,

    /// Cluster on color alone, without the pixel position.
    #[arg(long)]
    no_position: bool,

    #[arg(long)]
    verbose: bool,

    input: PathBuf,

    output: PathBuf,

    #[command(subcommand)]
    method: CliMethod,
}

fn parse_cluster_count(s: &str) -> Result<ClusterCount, String> {
    let value: u16 = s.parse().map_err(|e| format!("{e}"))?;
    value.try_into().map_err(|e| format!("{e}"))
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let Options { k, no_position, verbose, input, output, method } = Options::parse();

    macro_rules! time {
        ($name: literal, $val: expr) => {
            if verbose {
                let time = std::time::Instant::now();
                let value = $val;
                println!("{} took {}ms", $name, time.elapsed().as_millis());
                value
            } else {
                $val
            }
        };
    }

    let image = time!("read image", codec::open(input)?);

    let (method, downsample) = match method {
        CliMethod::Kmeans { seed, max_iterations } => (
            Method::from(KmeansOptions::new().seed(seed).max_iterations(max_iterations)),
            DownsamplePolicy::Shrink,
        ),
        CliMethod::Gmm { seed, max_iterations, reg_covar } => (
            Method::from(
                GmmOptions::new()
                    .seed(seed)
                    .max_iterations(max_iterations)
                    .reg_covar(reg_covar),
            ),
            DownsamplePolicy::Shrink,
        ),
        CliMethod::Hierarchical { linkage, max_pixels, restore } => (
            Method::from(
                HierarchicalOptions::new()
                    .linkage(linkage.into())
                    .max_pixels(max_pixels),
            ),
            if restore {
                DownsamplePolicy::Restore
            } else {
                DownsamplePolicy::Shrink
            },
        ),
    };

    let options = SegmentOptions::new()
        .k(k)
        .include_position(!no_position)
        .method(method)
        .downsample(downsample);

    let segmented = time!("segmentation", segment_output(&image, &options)?);

    if verbose {
        if let Some((width, height)) = segmented.downsampled {
            println!(
                "clustered at {width}x{height} instead of {}x{}",
                image.width(),
                image.height()
            );
        }
        for (color, count) in segmented.palette.iter().zip(&segmented.counts) {
            println!("#{:02x}{:02x}{:02x}: {count} pixels", color.red, color.green, color.blue);
        }
    }

    time!("write image", segmented.image.save(output)?);

    Ok(())
}
