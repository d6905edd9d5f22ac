//! Core raster and geometry utilities for scanned-bundle intake.
//!
//! This crate is intentionally small. It knows nothing about exams, fiducial
//! payloads or record stores; it only provides the grayscale raster types,
//! the affine machinery used to right a scanned page, content hashing and the
//! logger shared by the other `bundle-intake-*` crates.

mod affine;
mod hash;
mod image;
mod logger;

pub use affine::{affine_from_3pt, warp_affine_gray, AffineTransform};
pub use hash::{raster_hash, sha256_hex};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
