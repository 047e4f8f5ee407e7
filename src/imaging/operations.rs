//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take configuration, compute parameters, and call the backend.

use super::backend::{BackendError, DecodedImage, Dimensions, ImageBackend};
use super::calculations::{effective_widths, scaled_height};
use super::params::{Effort, Quality, ResizeParams};
use crate::config::Config;
use crate::naming::{SourcePath, derivative_path};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Encoder settings shared by every rung of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    pub quality: Quality,
    pub effort: Effort,
    pub strip_metadata: bool,
}

impl EncodeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            quality: Quality::new(config.quality),
            effort: Effort::new(config.effort),
            strip_metadata: config.strip_metadata,
        }
    }
}

/// One rendition to produce: target size and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RungPlan {
    pub width: u32,
    pub height: u32,
    pub output_path: String,
}

/// Every rung an original of `original` dimensions should have, smallest
/// ladder entry first.
pub fn plan_rungs(
    original: Dimensions,
    ladder: &[u32],
    folder: &str,
    source: &SourcePath,
) -> Vec<RungPlan> {
    effective_widths(original.width, ladder)
        .into_iter()
        .map(|width| RungPlan {
            width,
            height: scaled_height(original, width),
            output_path: derivative_path(folder, source, width),
        })
        .collect()
}

/// Resize and encode one planned rung from an already decoded original.
pub fn render_rung(
    backend: &impl ImageBackend,
    image: &DecodedImage,
    plan: &RungPlan,
    settings: EncodeSettings,
) -> Result<Vec<u8>> {
    backend.resize(
        image,
        &ResizeParams {
            width: plan.width,
            height: plan.height,
            quality: settings.quality,
            effort: settings.effort,
            strip_metadata: settings.strip_metadata,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};

    fn source() -> SourcePath {
        SourcePath::parse("pics/a.jpg").unwrap()
    }

    #[test]
    fn plan_rungs_skips_widths_above_original() {
        let plans = plan_rungs(
            Dimensions {
                width: 200,
                height: 100,
            },
            &[120, 160, 240],
            "derivatives",
            &source(),
        );
        assert_eq!(
            plans,
            vec![
                RungPlan {
                    width: 120,
                    height: 60,
                    output_path: "derivatives/pics/a.jpg-120.webp".to_string(),
                },
                RungPlan {
                    width: 160,
                    height: 80,
                    output_path: "derivatives/pics/a.jpg-160.webp".to_string(),
                },
            ]
        );
    }

    #[test]
    fn plan_rungs_for_tiny_original_uses_its_width() {
        let plans = plan_rungs(
            Dimensions {
                width: 90,
                height: 45,
            },
            &[120, 160],
            "d",
            &source(),
        );
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].width, 90);
        assert_eq!(plans[0].height, 45);
        assert_eq!(plans[0].output_path, "d/pics/a.jpg-90.webp");
    }

    #[test]
    fn render_rung_passes_encoder_settings() {
        let backend = MockBackend::with_dimensions(400, 300);
        let decoded = backend.decode(b"", u64::MAX).unwrap();
        let plan = RungPlan {
            width: 200,
            height: 150,
            output_path: "d/a.jpg-200.webp".to_string(),
        };
        let settings = EncodeSettings {
            quality: Quality::new(70),
            effort: Effort::new(6),
            strip_metadata: false,
        };

        let bytes = render_rung(&backend, &decoded, &plan, settings).unwrap();
        assert_eq!(bytes, b"webp 200x150 q70 e6");
        assert_eq!(
            backend.get_operations().last().unwrap(),
            &RecordedOp::Resize {
                width: 200,
                height: 150,
                quality: 70,
                effort: 6,
                strip_metadata: false,
            }
        );
    }

    #[test]
    fn settings_from_config_clamp() {
        let config = Config {
            quality: 0,
            effort: 12,
            ..Config::default()
        };
        let settings = EncodeSettings::from_config(&config);
        assert_eq!(settings.quality.value(), 1);
        assert_eq!(settings.effort.value(), 6);
        assert!(settings.strip_metadata);
    }
}
