//! A library for unsupervised image segmentation by clustering per-pixel features.
//!
//! Every pixel is turned into a feature vector (its color, optionally followed by its
//! normalized position), the feature vectors are grouped into `k` clusters, and every pixel of
//! the output image is replaced by the representative color of its cluster.
//!
//! Three clustering methods are supported, see [`Method`]:
//! - k-means, which is fast and gives compact, roughly spherical clusters.
//! - Gaussian mixtures, which assign pixels by likelihood and allow elliptical clusters.
//! - Agglomerative (hierarchical) clustering, with several linkage criteria.
//!   This method is quadratic in the number of pixels,
//!   so images are downsampled before clustering (see [`HierarchicalOptions::max_pixels`]).
//!
//! # High-Level API
//! ```no_run
//! # use clusterseg::{segment, ClusterCount, Method, SegmentOptions, HierarchicalOptions, Linkage};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let img = clusterseg::codec::open("some image")?;
//!
//! let options = SegmentOptions::new()
//!     .k(ClusterCount::try_from(8u16)?)
//!     .include_position(false)
//!     .method(Method::Hierarchical(
//!         HierarchicalOptions::new().linkage(Linkage::Average).max_pixels(20_000),
//!     ));
//!
//! let segmented = segment(&img, &options)?;
//! segmented.save("segmented.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! The lower-level building blocks are also exposed:
//! [`features`] for feature extraction, [`assign`] for the clustering backends,
//! [`resolve`] for computing cluster colors, and [`render`] for producing the output image.

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    clippy::missing_docs_in_private_items,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::missing_panics_doc,
    clippy::unreadable_literal,
    clippy::wildcard_imports
)]

mod api;
mod error;
mod types;

pub mod assign;
pub mod codec;
pub mod features;
pub mod render;
pub mod resolve;

pub use api::*;
pub use error::*;
pub use types::*;

/// The maximum supported number of clusters is `256`.
pub const MAX_CLUSTERS: u16 = u8::MAX as u16 + 1;

/// The minimum supported number of clusters is `2`.
pub const MIN_CLUSTERS: u16 = 2;
