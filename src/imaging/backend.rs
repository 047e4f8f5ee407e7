//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait covers the three steps a generation job needs:
//! identify (header only), decode (once per job), and resize + encode (once
//! per rung). The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::ResizeParams;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Image is {width}x{height}, above the {max_pixels} pixel limit")]
    TooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },
    #[error("Encoding failed: {0}")]
    Encode(String),
}

/// Result of an identify operation, with EXIF orientation already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn pixels(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A decoded original, held in memory for the whole job.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub bitmap: DynamicImage,
    /// Embedded ICC profile, if any.
    pub icc_profile: Option<Vec<u8>>,
    /// Raw EXIF blob, only kept when it still describes the bitmap
    /// (i.e. no orientation transform was applied).
    pub exif: Option<Vec<u8>>,
}

impl DecodedImage {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.bitmap.width(),
            height: self.bitmap.height(),
        }
    }
}

/// Trait for image processing backends.
pub trait ImageBackend: Send + Sync {
    /// Read dimensions from the header without decoding pixels.
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError>;

    /// Decode the full bitmap. Must refuse images above `max_pixels` before
    /// allocating.
    fn decode(&self, bytes: &[u8], max_pixels: u64) -> Result<DecodedImage, BackendError>;

    /// Resize the decoded original and encode one rung.
    fn resize(&self, image: &DecodedImage, params: &ResizeParams)
    -> Result<Vec<u8>, BackendError>;
}
