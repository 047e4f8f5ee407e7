//! Shared test utilities: in-memory image fixtures.
//!
//! Fixtures are encoded on the fly so the test suite needs no binary files
//! checked into the repository.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let bytes = jpeg_bytes(400, 300);
//! disk.write_atomic("pics/a.jpg", &bytes).unwrap();
//! ```

use image::{ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};

/// A gradient JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// A half-transparent PNG of the given size.
pub fn png_rgba_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 200, if x < width / 2 { 0 } else { 255 }])
    });
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
        .unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_decode_at_requested_size() {
        let jpeg = image::load_from_memory(&jpeg_bytes(40, 30)).unwrap();
        assert_eq!((jpeg.width(), jpeg.height()), (40, 30));

        let png = image::load_from_memory(&png_rgba_bytes(20, 10)).unwrap();
        assert_eq!((png.width(), png.height()), (20, 10));
        assert!(png.color().has_alpha());
    }
}
