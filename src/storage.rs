//! Storage backends for originals and their renditions.
//!
//! Every path handed to a [`Storage`] is disk-relative (see
//! [`SourcePath`](crate::naming::SourcePath)). The backend is the only
//! resource shared between generation workers, so its one hard requirement
//! is atomic create-or-replace: [`Storage::write_atomic`] must never expose a
//! partially written file to a concurrent reader.
//!
//! [`LocalDisk`] satisfies that by writing into a temp file in the destination
//! directory and renaming it over the final path. Rename within a directory
//! is atomic on every platform we target, so no locking is needed: two workers
//! racing on the same rung both produce a complete file and the last rename
//! wins.

use crate::config::DiskConfig;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(path: &str, source: io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// Minimal file store contract.
pub trait Storage: Send + Sync {
    /// Read a whole file.
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Create or replace a file so readers only ever see the old or the new
    /// complete contents.
    fn write_atomic(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Whether a file currently exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Public URL for `path`.
    fn url(&self, path: &str) -> String;
}

/// Storage rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalDisk {
    root: PathBuf,
    base_url: String,
}

impl LocalDisk {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(disk: &DiskConfig) -> Self {
        Self::new(&disk.root, &disk.url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a disk-relative path to a filesystem path under the root.
    ///
    /// Absolute paths and `..` segments are refused so nothing can be read
    /// or written outside the disk.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let mut full = self.root.clone();
        let mut has_file = false;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    full.push(part);
                    has_file = true;
                }
                Component::CurDir => {}
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }
        if !has_file {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(full)
    }
}

impl Storage for LocalDisk {
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            _ => StorageError::io(path, e),
        })
    }

    fn write_atomic(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        let parent = full
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(path.to_string()))?;
        fs::create_dir_all(parent).map_err(|e| StorageError::io(path, e))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".pic-ladder-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|e| StorageError::io(path, e))?;
        tmp.write_all(bytes).map_err(|e| StorageError::io(path, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StorageError::io(path, e))?;

        // Temp files are created owner-only; renditions are served publicly.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o644))
                .map_err(|e| StorageError::io(path, e))?;
        }

        tmp.persist(&full)
            .map_err(|e| StorageError::io(path, e.error))?;
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|full| full.is_file())
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.is_empty() && !self.base_url.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }
}
