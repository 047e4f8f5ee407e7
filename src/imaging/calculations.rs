//! Pure calculation functions for rung dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::backend::Dimensions;

/// Ladder widths to generate for an original of `original_width` pixels.
///
/// Keeps every width that does not exceed the original, in ladder order.
/// If the original is narrower than the smallest rung, the original width is
/// the only entry: renditions are never upscaled.
///
/// ```text
/// ladder [120, 160, 240], original 200 → [120, 160]
/// ladder [120, 160, 240], original 100 → [100]
/// ladder [120, 160, 240], original 240 → [120, 160, 240]
/// ```
pub fn effective_widths(original_width: u32, ladder: &[u32]) -> Vec<u32> {
    let widths: Vec<u32> = ladder
        .iter()
        .copied()
        .filter(|&w| w <= original_width)
        .collect();

    if widths.is_empty() {
        vec![original_width]
    } else {
        widths
    }
}

/// Height of a rung `width` pixels wide, preserving the original aspect ratio.
///
/// Never returns zero, so extreme panoramas still produce a valid image.
pub fn scaled_height(original: Dimensions, width: u32) -> u32 {
    if original.width == 0 {
        return original.height.max(1);
    }
    let ratio = width as f64 / original.width as f64;
    ((original.height as f64 * ratio).round() as u32).max(1)
}

/// Whether decoding `dims` would exceed the configured pixel ceiling.
pub fn exceeds_pixel_limit(dims: Dimensions, max_pixels: u64) -> bool {
    dims.pixels() > max_pixels
}
