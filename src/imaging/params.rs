//! Parameter types for image operations.
//!
//! These structs describe *what* to produce, not *how*. They are the
//! interface between rung planning in [`operations`](super::operations) and
//! the pixel work in the [`backend`](super::backend), which lets tests swap
//! in a recording mock without touching planning logic.
//!
//! - [`Quality`]: lossy WebP quality (1–100). Clamped on construction.
//! - [`Effort`]: WebP compression method (0–6). Clamped on construction.
//! - [`ResizeParams`]: target dimensions plus encoder settings for one rung.

/// Quality setting for lossy encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// WebP compression method: 0 is fastest, 6 is slowest and smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effort(u32);

impl Effort {
    pub fn new(value: u32) -> Self {
        Self(value.min(6))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Effort {
    fn default() -> Self {
        Self(4)
    }
}

/// Everything needed to render one rung from a decoded original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
    pub effort: Effort,
    pub strip_metadata: bool,
}
