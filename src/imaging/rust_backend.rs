//! Production image backend built on the `image` and `webp` crates.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify (header only) | `image::ImageReader` + `ImageDecoder::dimensions` |
//! | Decode (JPEG, PNG, GIF, TIFF, WebP) | `image` crate decoders, format sniffed from bytes |
//! | EXIF orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Encode → lossy WebP | `webp::Encoder` (libwebp) with quality and method |
//! | ICC / EXIF passthrough | [`webp_mux`](super::webp_mux) |

use super::backend::{BackendError, DecodedImage, Dimensions, ImageBackend};
use super::params::ResizeParams;
use super::webp_mux;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, Limits};
use std::io::Cursor;

/// Backend using pure Rust decoders and libwebp for encoding.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn open_reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, BackendError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| BackendError::Decode(e.to_string()))
}

/// Whether applying `orientation` swaps width and height.
fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

impl ImageBackend for RustBackend {
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
        let mut decoder = open_reader(bytes)?
            .into_decoder()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let (width, height) = decoder.dimensions();
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        Ok(if swaps_axes(orientation) {
            Dimensions {
                width: height,
                height: width,
            }
        } else {
            Dimensions { width, height }
        })
    }

    fn decode(&self, bytes: &[u8], max_pixels: u64) -> Result<DecodedImage, BackendError> {
        let mut reader = open_reader(bytes)?;
        let mut limits = Limits::default();
        // Largest pixel type the decoders produce is RGBA f32.
        limits.max_alloc = Some(max_pixels.saturating_mul(16));
        reader.limits(limits);

        let mut decoder = reader
            .into_decoder()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let (width, height) = decoder.dimensions();
        if (width as u64) * (height as u64) > max_pixels {
            return Err(BackendError::TooLarge {
                width,
                height,
                max_pixels,
            });
        }

        // Metadata is best effort: a broken ICC or EXIF block should not
        // cost us the whole image.
        let icc_profile = decoder.icc_profile().ok().flatten();
        let exif = decoder.exif_metadata().ok().flatten();
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

        let mut bitmap =
            DynamicImage::from_decoder(decoder).map_err(|e| BackendError::Decode(e.to_string()))?;
        bitmap.apply_orientation(orientation);

        Ok(DecodedImage {
            bitmap,
            icc_profile,
            // EXIF still says "rotate" after we rotated the pixels.
            exif: exif.filter(|_| orientation == Orientation::NoTransforms),
        })
    }

    fn resize(
        &self,
        image: &DecodedImage,
        params: &ResizeParams,
    ) -> Result<Vec<u8>, BackendError> {
        let resized = image
            .bitmap
            .resize_exact(params.width, params.height, FilterType::Lanczos3);

        let (width, height) = (params.width, params.height);
        let encoded = if resized.color().has_alpha() {
            let rgba = resized.to_rgba8();
            encode_webp(webp::Encoder::from_rgba(rgba.as_raw(), width, height), params)?
        } else {
            let rgb = resized.to_rgb8();
            encode_webp(webp::Encoder::from_rgb(rgb.as_raw(), width, height), params)?
        };

        if params.strip_metadata {
            return Ok(encoded);
        }
        webp_mux::embed_metadata(
            &encoded,
            width,
            height,
            image.icc_profile.as_deref(),
            image.exif.as_deref(),
        )
    }
}

fn encode_webp(
    encoder: webp::Encoder<'_>,
    params: &ResizeParams,
) -> Result<Vec<u8>, BackendError> {
    let mut config = webp::WebPConfig::new()
        .map_err(|_| BackendError::Encode("libwebp config init failed".to_string()))?;
    config.quality = params.quality.value() as f32;
    config.method = params.effort.value() as i32;
    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| BackendError::Encode(format!("{e:?}")))?;
    Ok(memory.to_vec())
}
