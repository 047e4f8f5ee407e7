//! Render-time lookup of existing renditions.
//!
//! The resolver only looks: it checks which rungs are on disk and turns
//! them into `srcset` candidates. It never queues or generates anything, so
//! a page rendered before its renditions exist simply falls back to the
//! original image.
//!
//! ## Cost
//!
//! Finding ladder rungs costs one `exists` per ladder width. Only a source
//! with no ladder rung on disk needs its original width, which means reading
//! the original and parsing its header. That happens at most once per source
//! per resolver: successful widths are remembered, so keep one resolver
//! alive across renders rather than building one per page.

use crate::config::Config;
use crate::imaging::{ImageBackend, RustBackend};
use crate::naming::{SourcePath, derivative_path, is_external};
use crate::storage::Storage;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// One `"<url> <width>w"` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SrcsetCandidate {
    pub url: String,
    pub width: u32,
}

impl fmt::Display for SrcsetCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}w", self.url, self.width)
    }
}

/// What a template needs for one `<img>`: the original as fallback `src`,
/// plus a WebP `srcset` when renditions exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PictureSources {
    pub src: String,
    pub srcset: Option<String>,
}

pub struct SrcsetResolver<B: ImageBackend = RustBackend> {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    backend: B,
    /// Original widths already read from headers.
    original_widths: Mutex<HashMap<SourcePath, u32>>,
}

impl SrcsetResolver<RustBackend> {
    pub fn new(config: Arc<Config>, storage: Arc<dyn Storage>) -> Self {
        Self::with_backend(config, storage, RustBackend::new())
    }
}

impl<B: ImageBackend> SrcsetResolver<B> {
    pub fn with_backend(config: Arc<Config>, storage: Arc<dyn Storage>, backend: B) -> Self {
        Self {
            config,
            storage,
            backend,
            original_widths: Mutex::new(HashMap::new()),
        }
    }

    /// Existing rungs of `source`, narrowest first.
    ///
    /// Ladder rungs are checked first. Only when none exist is the original
    /// consulted: an original narrower than the smallest rung has a single
    /// rendition at its own width, found by reading its header.
    pub fn resolve(&self, source: &SourcePath) -> Vec<SrcsetCandidate> {
        let folder = &self.config.folder;
        let candidates: Vec<SrcsetCandidate> = self
            .config
            .ladder
            .iter()
            .map(|&width| (width, derivative_path(folder, source, width)))
            .filter(|(_, path)| self.storage.exists(path))
            .map(|(width, path)| SrcsetCandidate {
                url: self.storage.url(&path),
                width,
            })
            .collect();
        if !candidates.is_empty() {
            return candidates;
        }
        self.original_width_rung(source).into_iter().collect()
    }

    /// The `srcset` attribute value, or `None` when no rendition exists.
    pub fn build_webp_srcset(&self, source: &SourcePath) -> Option<String> {
        let candidates = self.resolve(source);
        if candidates.is_empty() {
            return None;
        }
        Some(
            candidates
                .iter()
                .map(SrcsetCandidate::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    /// Fallback `src` and optional `srcset` for a raw content reference.
    ///
    /// External URLs pass through untouched with no `srcset`.
    pub fn picture_sources(&self, raw: &str) -> PictureSources {
        if is_external(raw) {
            return PictureSources {
                src: raw.trim().to_string(),
                srcset: None,
            };
        }
        match SourcePath::parse(raw) {
            Ok(source) => PictureSources {
                src: self.storage.url(source.as_str()),
                srcset: self.build_webp_srcset(&source),
            },
            Err(_) => PictureSources {
                src: raw.trim().to_string(),
                srcset: None,
            },
        }
    }

    fn original_width_rung(&self, source: &SourcePath) -> Option<SrcsetCandidate> {
        let width = self.original_width(source)?;
        if width >= self.config.smallest_rung() {
            return None;
        }
        let path = derivative_path(&self.config.folder, source, width);
        self.storage.exists(&path).then(|| SrcsetCandidate {
            url: self.storage.url(&path),
            width,
        })
    }

    /// Width of the original, read once. Failures are not remembered so a
    /// later upload is picked up.
    fn original_width(&self, source: &SourcePath) -> Option<u32> {
        let known = self
            .original_widths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .copied();
        if known.is_some() {
            return known;
        }

        let bytes = self
            .storage
            .read(source.as_str())
            .inspect_err(|e| debug!(source = %source, error = %e, "original unavailable"))
            .ok()?;
        let dims = self
            .backend
            .identify(&bytes)
            .inspect_err(|e| debug!(source = %source, error = %e, "original unreadable"))
            .ok()?;
        self.original_widths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.clone(), dims.width);
        Some(dims.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::storage::LocalDisk;
    use tempfile::TempDir;

    fn setup(
        ladder: &[u32],
        base_url: &str,
        backend: MockBackend,
    ) -> (TempDir, Arc<LocalDisk>, SrcsetResolver<MockBackend>) {
        let tmp = TempDir::new().unwrap();
        let disk = Arc::new(LocalDisk::new(tmp.path(), base_url));
        let config = Arc::new(Config {
            ladder: ladder.to_vec(),
            folder: String::new(),
            ..Config::default()
        });
        let resolver = SrcsetResolver::with_backend(config, disk.clone(), backend);
        (tmp, disk, resolver)
    }

    fn source() -> SourcePath {
        SourcePath::parse("a.jpg").unwrap()
    }

    #[test]
    fn ladder_scenario_lists_existing_rungs_ascending() {
        let (_tmp, disk, resolver) =
            setup(&[120, 160, 240], "", MockBackend::with_dimensions(200, 100));
        disk.write_atomic("a.jpg-160.webp", b"x").unwrap();
        disk.write_atomic("a.jpg-120.webp", b"x").unwrap();

        assert_eq!(
            resolver.build_webp_srcset(&source()).as_deref(),
            Some("a.jpg-120.webp 120w, a.jpg-160.webp 160w")
        );
        // Ladder rungs found: the original is never opened.
        assert!(resolver.backend.get_operations().is_empty());
    }

    #[test]
    fn nothing_generated_is_none() {
        let (_tmp, _disk, resolver) =
            setup(&[120, 160], "", MockBackend::with_dimensions(200, 100));
        assert_eq!(resolver.build_webp_srcset(&source()), None);
        assert!(resolver.resolve(&source()).is_empty());
    }

    #[test]
    fn urls_use_disk_base() {
        let (_tmp, disk, resolver) =
            setup(&[120], "/storage", MockBackend::with_dimensions(200, 100));
        disk.write_atomic("a.jpg-120.webp", b"x").unwrap();
        assert_eq!(
            resolver.resolve(&source()),
            vec![SrcsetCandidate {
                url: "/storage/a.jpg-120.webp".to_string(),
                width: 120,
            }]
        );
    }

    #[test]
    fn narrow_original_rung_found_via_header() {
        let (_tmp, disk, resolver) =
            setup(&[120, 160], "", MockBackend::with_dimensions(90, 60));
        disk.write_atomic("a.jpg", b"original").unwrap();
        disk.write_atomic("a.jpg-90.webp", b"x").unwrap();

        assert_eq!(
            resolver.build_webp_srcset(&source()).as_deref(),
            Some("a.jpg-90.webp 90w")
        );
        assert_eq!(resolver.backend.get_operations(), vec![RecordedOp::Identify]);
    }

    #[test]
    fn wide_original_without_rungs_is_none() {
        let (_tmp, disk, resolver) =
            setup(&[120, 160], "", MockBackend::with_dimensions(400, 300));
        disk.write_atomic("a.jpg", b"original").unwrap();
        assert_eq!(resolver.build_webp_srcset(&source()), None);
    }

    #[test]
    fn original_header_read_once_per_source() {
        let (_tmp, disk, resolver) =
            setup(&[120, 160], "", MockBackend::with_dimensions(400, 300));
        disk.write_atomic("a.jpg", b"original").unwrap();

        for _ in 0..3 {
            assert_eq!(resolver.build_webp_srcset(&source()), None);
        }
        assert_eq!(resolver.backend.get_operations(), vec![RecordedOp::Identify]);
    }

    #[test]
    fn missing_original_is_retried() {
        let (_tmp, disk, resolver) =
            setup(&[120, 160], "", MockBackend::with_dimensions(90, 60));
        assert_eq!(resolver.build_webp_srcset(&source()), None);

        disk.write_atomic("a.jpg", b"original").unwrap();
        disk.write_atomic("a.jpg-90.webp", b"x").unwrap();
        assert_eq!(
            resolver.build_webp_srcset(&source()).as_deref(),
            Some("a.jpg-90.webp 90w")
        );
    }

    #[test]
    fn resolver_never_writes() {
        let (tmp, disk, resolver) =
            setup(&[120, 160], "", MockBackend::with_dimensions(90, 60));
        disk.write_atomic("a.jpg", b"original").unwrap();

        resolver.build_webp_srcset(&source());

        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg"]);
    }

    #[test]
    fn picture_sources_for_local_and_external() {
        let (_tmp, disk, resolver) =
            setup(&[120], "/storage", MockBackend::with_dimensions(200, 100));
        disk.write_atomic("a.jpg-120.webp", b"x").unwrap();

        assert_eq!(
            resolver.picture_sources("/storage/a.jpg"),
            PictureSources {
                src: "/storage/a.jpg".to_string(),
                srcset: Some("/storage/a.jpg-120.webp 120w".to_string()),
            }
        );
        assert_eq!(
            resolver.picture_sources("https://cdn.example.com/b.jpg"),
            PictureSources {
                src: "https://cdn.example.com/b.jpg".to_string(),
                srcset: None,
            }
        );
    }
}
