//! Canonical source paths and deterministic derivative names.
//!
//! Stored content spells the same upload in several ways: `pics/a.jpg`,
//! `/pics/a.jpg`, `storage/pics/a.jpg`, `/storage/pics/a.jpg?v=3`. All of
//! them normalize to one disk-relative [`SourcePath`] so that sets collapse
//! duplicates and every component agrees on where renditions live.
//!
//! ## Derivative Layout
//!
//! One file per (source, width) pair, no index:
//!
//! ```text
//! {folder}/{dir(source)}/{file_name(source)}-{width}.webp
//!
//! pics/2024/a.jpg, width 320 → derivatives/pics/2024/a.jpg-320.webp
//! ```
//!
//! The output path depends only on the source path and the width, never on
//! file contents, so regenerating a rung overwrites the same file. The full
//! file name is kept so `a.jpg` and `a.png` never share renditions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// File extension of every derivative.
pub const DERIVATIVE_EXT: &str = "webp";

/// Prefix the public storage symlink adds in front of disk-relative paths.
const STORAGE_PREFIX: &str = "storage/";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathRejection {
    #[error("empty path")]
    Empty,
    #[error("external URL: {0}")]
    External(String),
    #[error("inline data URI")]
    DataUri,
    #[error("path escapes the disk root: {0}")]
    Traversal(String),
}

/// Disk-relative key of an uploaded original, in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourcePath(String);

impl SourcePath {
    /// Normalize a raw reference into a canonical source path.
    ///
    /// - `"/storage/pics/a.jpg"` → `pics/a.jpg`
    /// - `"storage/pics/a.jpg"` → `pics/a.jpg`
    /// - `" pics//./a.jpg?v=2 "` → `pics/a.jpg`
    /// - `"https://cdn.example.com/a.jpg"` → rejected
    pub fn parse(raw: &str) -> Result<Self, PathRejection> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathRejection::Empty);
        }
        if is_external(trimmed) {
            return Err(PathRejection::External(trimmed.to_string()));
        }
        if trimmed
            .get(..5)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
        {
            return Err(PathRejection::DataUri);
        }

        let without_query = trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .replace('\\', "/");
        let mut rest = without_query.trim_start_matches('/');
        if let Some(stripped) = rest.strip_prefix(STORAGE_PREFIX) {
            rest = stripped.trim_start_matches('/');
        }

        let mut segments = Vec::new();
        for segment in rest.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(PathRejection::Traversal(trimmed.to_string())),
                s => segments.push(s),
            }
        }
        if segments.is_empty() {
            return Err(PathRejection::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory part, empty for top-level files.
    pub fn dir(&self) -> &str {
        self.0.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    /// Last path segment, extension included.
    pub fn file_name(&self) -> &str {
        self.0.rsplit_once('/').map(|(_, f)| f).unwrap_or(&self.0)
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SourcePath {
    type Error = PathRejection;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SourcePath> for String {
    fn from(value: SourcePath) -> Self {
        value.0
    }
}

/// True for references that point off the disk (`http://`, `https://`,
/// protocol-relative `//host/...`, or any other `scheme://`).
pub fn is_external(raw: &str) -> bool {
    let lower = raw.trim_start().to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("//")
        || lower
            .split_once("://")
            .is_some_and(|(scheme, _)| !scheme.is_empty() && scheme.chars().all(is_scheme_char))
}

fn is_scheme_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')
}

/// Disk-relative path of the rendition of `source` at `width`.
pub fn derivative_path(folder: &str, source: &SourcePath, width: u32) -> String {
    let file_name = format!("{}-{}.{}", source.file_name(), width, DERIVATIVE_EXT);
    [folder.trim_matches('/'), source.dir(), file_name.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}
