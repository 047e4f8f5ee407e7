//! Image processing: identify, decode once, resize and encode lossy WebP.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader` header read, orientation-aware |
//! | **Decode** | `image` decoders behind a pixel ceiling |
//! | **Resize → WebP** | Lanczos3 + libwebp (quality, method) |
//! | **Metadata passthrough** | VP8X container rewrite |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Rung planning and rendering on top of a backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;
mod webp_mux;

pub use backend::{BackendError, DecodedImage, Dimensions, ImageBackend};
pub use calculations::exceeds_pixel_limit;
pub use operations::{EncodeSettings, RungPlan, plan_rungs, render_rung};
pub use params::{Effort, Quality, ResizeParams};
pub use rust_backend::RustBackend;
