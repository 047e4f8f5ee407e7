//! Derivative generation for a single source image.
//!
//! A [`Generator`] turns one [`SourcePath`] into its ladder of WebP
//! renditions. It is the unit of work the [`queue`](crate::queue) pool runs
//! and the `generate` CLI command calls directly.
//!
//! ## Job Steps
//!
//! ```text
//! read original → identify header → plan rungs
//!   → all rungs present and not forced?  done, nothing decoded
//!   → pixel ceiling check → decode once
//!   → per rung: resize → encode → write_atomic
//! ```
//!
//! ## Idempotency
//!
//! Output paths depend only on (source, width), so an existing file means
//! the rung was already produced. Without `force` those rungs are skipped;
//! with `force` every rung is re-encoded and replaced. Nothing here deletes
//! files: rungs left over from an older ladder stay where they are.
//!
//! ## Failure Granularity
//!
//! Missing or undecodable originals fail the whole call. A rung that fails
//! to encode or write is reported as [`RungStatus::Failed`] and the
//! remaining rungs still run.

use crate::config::Config;
use crate::imaging::{
    BackendError, EncodeSettings, ImageBackend, RustBackend, exceeds_pixel_limit, plan_rungs,
    render_rung,
};
use crate::naming::SourcePath;
use crate::storage::{Storage, StorageError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Source image not found: {0}")]
    NotFound(SourcePath),
    #[error("Cannot decode {path}: {error}")]
    Decode {
        path: SourcePath,
        #[source]
        error: BackendError,
    },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Generation of {path} timed out after {elapsed:?}")]
    TimedOut { path: SourcePath, elapsed: Duration },
}

/// Wall-clock budget for one job, checked between steps.
///
/// A single resize is never interrupted; the job stops at the next check.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget: Some(budget),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            budget: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.budget.is_some_and(|budget| self.elapsed() >= budget)
    }

    fn check(&self, path: &SourcePath) -> Result<(), GenerateError> {
        if self.is_expired() {
            return Err(GenerateError::TimedOut {
                path: path.clone(),
                elapsed: self.elapsed(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RungStatus {
    /// Encoded and written in this call.
    Written,
    /// Already present and not forced.
    Skipped,
    /// Encode or write failed; other rungs were still attempted.
    Failed(String),
}

/// What happened to one rung of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RungOutcome {
    pub width: u32,
    pub height: u32,
    pub output_path: String,
    pub status: RungStatus,
}

/// Produces the rendition ladder for individual sources.
pub struct Generator<B: ImageBackend = RustBackend> {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    backend: B,
}

impl Generator<RustBackend> {
    pub fn new(config: Arc<Config>, storage: Arc<dyn Storage>) -> Self {
        Self::with_backend(config, storage, RustBackend::new())
    }
}

impl<B: ImageBackend> Generator<B> {
    /// Use a specific backend (allows testing with mock).
    pub fn with_backend(config: Arc<Config>, storage: Arc<dyn Storage>, backend: B) -> Self {
        Self {
            config,
            storage,
            backend,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Generate every rung of `source` within the configured job timeout.
    pub fn generate(
        &self,
        source: &SourcePath,
        force: bool,
    ) -> Result<Vec<RungOutcome>, GenerateError> {
        let budget = self.config.processing.job_timeout();
        self.generate_within(source, force, Deadline::after(budget))
    }

    /// Generate every rung of `source`, giving up once `deadline` passes.
    ///
    /// Rungs written before the deadline stay on disk; they are complete
    /// files and a later call skips them.
    pub fn generate_within(
        &self,
        source: &SourcePath,
        force: bool,
        deadline: Deadline,
    ) -> Result<Vec<RungOutcome>, GenerateError> {
        deadline.check(source)?;
        info!(source = %source, force, "generating derivatives");

        let bytes = self.storage.read(source.as_str()).map_err(|e| match e {
            StorageError::NotFound(_) => GenerateError::NotFound(source.clone()),
            other => GenerateError::Storage(other),
        })?;
        let decode_error = |error| GenerateError::Decode {
            path: source.clone(),
            error,
        };

        let dims = self.backend.identify(&bytes).map_err(decode_error)?;
        let plans = plan_rungs(dims, &self.config.ladder, &self.config.folder, source);
        let pending: Vec<bool> = plans
            .iter()
            .map(|plan| force || !self.storage.exists(&plan.output_path))
            .collect();

        if !pending.contains(&true) {
            debug!(source = %source, "all rungs present");
            return Ok(plans
                .into_iter()
                .map(|plan| RungOutcome {
                    width: plan.width,
                    height: plan.height,
                    output_path: plan.output_path,
                    status: RungStatus::Skipped,
                })
                .collect());
        }

        let max_pixels = self.config.max_pixels;
        if exceeds_pixel_limit(dims, max_pixels) {
            return Err(decode_error(BackendError::TooLarge {
                width: dims.width,
                height: dims.height,
                max_pixels,
            }));
        }
        deadline.check(source)?;
        let decoded = self
            .backend
            .decode(&bytes, max_pixels)
            .map_err(decode_error)?;
        drop(bytes);

        let settings = EncodeSettings::from_config(&self.config);
        let mut outcomes = Vec::with_capacity(plans.len());
        for (plan, needed) in plans.into_iter().zip(pending) {
            let status = if !needed {
                debug!(path = %plan.output_path, "rung exists, skipping");
                RungStatus::Skipped
            } else {
                deadline.check(source)?;
                let written = render_rung(&self.backend, &decoded, &plan, settings)
                    .map_err(|e| e.to_string())
                    .and_then(|webp| {
                        self.storage
                            .write_atomic(&plan.output_path, &webp)
                            .map_err(|e| e.to_string())
                    });
                match written {
                    Ok(()) => {
                        debug!(path = %plan.output_path, width = plan.width, "rung written");
                        RungStatus::Written
                    }
                    Err(message) => {
                        warn!(path = %plan.output_path, error = %message, "rung failed");
                        RungStatus::Failed(message)
                    }
                }
            };
            outcomes.push(RungOutcome {
                width: plan.width,
                height: plan.height,
                output_path: plan.output_path,
                status,
            });
        }

        info!(
            source = %source,
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "derivatives done"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::storage::LocalDisk;
    use tempfile::TempDir;

    fn config(ladder: &[u32]) -> Arc<Config> {
        Arc::new(Config {
            ladder: ladder.to_vec(),
            ..Config::default()
        })
    }

    /// Temp disk holding a placeholder original at `pics/a.jpg`.
    fn disk_with_original() -> (TempDir, Arc<LocalDisk>) {
        let tmp = TempDir::new().unwrap();
        let disk = Arc::new(LocalDisk::new(tmp.path(), ""));
        disk.write_atomic("pics/a.jpg", b"original").unwrap();
        (tmp, disk)
    }

    fn source() -> SourcePath {
        SourcePath::parse("pics/a.jpg").unwrap()
    }

    fn statuses(outcomes: &[RungOutcome]) -> Vec<(u32, RungStatus)> {
        outcomes.iter().map(|o| (o.width, o.status.clone())).collect()
    }

    /// Storage wrapper whose writes fail for paths containing `needle`.
    struct FailingWrites {
        inner: Arc<LocalDisk>,
        needle: &'static str,
    }

    impl Storage for FailingWrites {
        fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
            self.inner.read(path)
        }
        fn write_atomic(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
            if path.contains(self.needle) {
                return Err(StorageError::Io {
                    path: path.to_string(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.inner.write_atomic(path, bytes)
        }
        fn exists(&self, path: &str) -> bool {
            self.inner.exists(path)
        }
        fn url(&self, path: &str) -> String {
            self.inner.url(path)
        }
    }

    // =========================================================================
    // Ladder behaviour
    // =========================================================================

    #[test]
    fn writes_rungs_not_wider_than_original() {
        let (_tmp, disk) = disk_with_original();
        let generator = Generator::with_backend(
            config(&[120, 160, 240]),
            disk.clone(),
            MockBackend::with_dimensions(200, 100),
        );

        let outcomes = generator.generate(&source(), false).unwrap();

        assert_eq!(
            statuses(&outcomes),
            vec![(120, RungStatus::Written), (160, RungStatus::Written)]
        );
        assert_eq!(outcomes[0].height, 60);
        assert!(disk.exists("derivatives/pics/a.jpg-120.webp"));
        assert!(disk.exists("derivatives/pics/a.jpg-160.webp"));
        assert!(!disk.exists("derivatives/pics/a.jpg-240.webp"));
        assert_eq!(
            disk.read("derivatives/pics/a.jpg-160.webp").unwrap(),
            b"webp 160x80 q80 e4"
        );
    }

    #[test]
    fn narrow_original_gets_single_rung_at_own_width() {
        let (_tmp, disk) = disk_with_original();
        let generator = Generator::with_backend(
            config(&[120, 160]),
            disk.clone(),
            MockBackend::with_dimensions(100, 50),
        );

        let outcomes = generator.generate(&source(), false).unwrap();

        assert_eq!(statuses(&outcomes), vec![(100, RungStatus::Written)]);
        assert!(disk.exists("derivatives/pics/a.jpg-100.webp"));
    }

    // =========================================================================
    // Idempotency and force
    // =========================================================================

    #[test]
    fn second_call_skips_without_decoding() {
        let (_tmp, disk) = disk_with_original();
        let generator = Generator::with_backend(
            config(&[120, 160]),
            disk,
            MockBackend::with_dimensions(400, 300),
        );

        generator.generate(&source(), false).unwrap();
        let second = generator.generate(&source(), false).unwrap();

        assert_eq!(
            statuses(&second),
            vec![(120, RungStatus::Skipped), (160, RungStatus::Skipped)]
        );
        assert_eq!(generator.backend().decode_count(), 1);
        assert_eq!(generator.backend().resized_widths(), vec![120, 160]);
    }

    #[test]
    fn force_rewrites_every_rung() {
        let (_tmp, disk) = disk_with_original();
        let generator = Generator::with_backend(
            config(&[120, 160]),
            disk.clone(),
            MockBackend::with_dimensions(400, 300),
        );

        generator.generate(&source(), false).unwrap();
        disk.write_atomic("derivatives/pics/a.jpg-120.webp", b"tampered")
            .unwrap();
        let forced = generator.generate(&source(), true).unwrap();

        assert_eq!(
            statuses(&forced),
            vec![(120, RungStatus::Written), (160, RungStatus::Written)]
        );
        assert_eq!(generator.backend().resized_widths(), vec![120, 160, 120, 160]);
        assert_eq!(
            disk.read("derivatives/pics/a.jpg-120.webp").unwrap(),
            b"webp 120x90 q80 e4"
        );
    }

    #[test]
    fn partial_ladder_fills_gaps_with_one_decode() {
        let (_tmp, disk) = disk_with_original();
        disk.write_atomic("derivatives/pics/a.jpg-120.webp", b"existing")
            .unwrap();
        let generator = Generator::with_backend(
            config(&[120, 160, 240]),
            disk.clone(),
            MockBackend::with_dimensions(400, 300),
        );

        let outcomes = generator.generate(&source(), false).unwrap();

        assert_eq!(
            statuses(&outcomes),
            vec![
                (120, RungStatus::Skipped),
                (160, RungStatus::Written),
                (240, RungStatus::Written)
            ]
        );
        assert_eq!(generator.backend().decode_count(), 1);
        assert_eq!(
            disk.read("derivatives/pics/a.jpg-120.webp").unwrap(),
            b"existing"
        );
    }

    #[test]
    fn stale_rungs_are_left_alone() {
        let (_tmp, disk) = disk_with_original();
        disk.write_atomic("derivatives/pics/a.jpg-999.webp", b"old ladder")
            .unwrap();
        let generator = Generator::with_backend(
            config(&[120]),
            disk.clone(),
            MockBackend::with_dimensions(400, 300),
        );

        generator.generate(&source(), true).unwrap();
        assert!(disk.exists("derivatives/pics/a.jpg-999.webp"));
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[test]
    fn missing_source_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let generator = Generator::with_backend(
            config(&[120]),
            Arc::new(LocalDisk::new(tmp.path(), "")),
            MockBackend::with_dimensions(400, 300),
        );

        let result = generator.generate(&source(), false);
        assert!(matches!(result, Err(GenerateError::NotFound(p)) if p == source()));
    }

    #[test]
    fn undecodable_source_fails_whole_call() {
        let (_tmp, disk) = disk_with_original();
        let backend = MockBackend {
            fail_decode: true,
            ..MockBackend::with_dimensions(400, 300)
        };
        let generator = Generator::with_backend(config(&[120]), disk.clone(), backend);

        assert!(matches!(
            generator.generate(&source(), false),
            Err(GenerateError::Decode { .. })
        ));
        assert!(!disk.exists("derivatives/pics/a.jpg-120.webp"));
    }

    #[test]
    fn pixel_bomb_rejected_before_decode() {
        let (_tmp, disk) = disk_with_original();
        let config = Arc::new(Config {
            ladder: vec![120],
            max_pixels: 1_000,
            ..Config::default()
        });
        let generator =
            Generator::with_backend(config, disk, MockBackend::with_dimensions(400, 300));

        assert!(matches!(
            generator.generate(&source(), false),
            Err(GenerateError::Decode {
                error: BackendError::TooLarge { .. },
                ..
            })
        ));
        assert_eq!(generator.backend().decode_count(), 0);
    }

    #[test]
    fn failed_write_does_not_stop_other_rungs() {
        let (_tmp, disk) = disk_with_original();
        let storage = Arc::new(FailingWrites {
            inner: disk.clone(),
            needle: "-160.",
        });
        let generator = Generator::with_backend(
            config(&[120, 160, 240]),
            storage,
            MockBackend::with_dimensions(400, 300),
        );

        let outcomes = generator.generate(&source(), false).unwrap();

        assert_eq!(outcomes[0].status, RungStatus::Written);
        assert!(matches!(&outcomes[1].status, RungStatus::Failed(m) if m.contains("disk full")));
        assert_eq!(outcomes[2].status, RungStatus::Written);
        assert!(disk.exists("derivatives/pics/a.jpg-240.webp"));
    }

    #[test]
    fn failed_encode_is_reported_per_rung() {
        let (_tmp, disk) = disk_with_original();
        let backend = MockBackend {
            fail_widths: vec![120],
            ..MockBackend::with_dimensions(400, 300)
        };
        let generator = Generator::with_backend(config(&[120, 160]), disk, backend);

        let outcomes = generator.generate(&source(), false).unwrap();
        assert!(matches!(outcomes[0].status, RungStatus::Failed(_)));
        assert_eq!(outcomes[1].status, RungStatus::Written);
    }

    #[test]
    fn expired_deadline_times_out() {
        let (_tmp, disk) = disk_with_original();
        let generator = Generator::with_backend(
            config(&[120]),
            disk.clone(),
            MockBackend::with_dimensions(400, 300),
        );

        let result = generator.generate_within(&source(), false, Deadline::after(Duration::ZERO));
        assert!(matches!(result, Err(GenerateError::TimedOut { .. })));
        assert!(generator.backend().get_operations().is_empty());
        assert!(!disk.exists("derivatives/pics/a.jpg-120.webp"));
    }

    #[test]
    fn unbounded_deadline_never_expires() {
        assert!(!Deadline::unbounded().is_expired());
        assert!(Deadline::after(Duration::ZERO).is_expired());
    }
}
