//! Derivative configuration.
//!
//! Handles loading and validating `pic-ladder.toml`. User files are sparse:
//! they are merged on top of the stock defaults, so a file that only sets
//! `quality` keeps every other default.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! disk = "public"             # Storage backend the sources live on
//! folder = "derivatives"      # Output root inside that disk
//! quality = 80                # WebP quality (1-100)
//! effort = 4                  # WebP method (0 = fastest, 6 = smallest)
//! strip_metadata = true       # Drop ICC/EXIF from renditions
//! ladder = [160, 320, 640, 960, 1280, 1920]
//! max_pixels = 100000000      # Decoded pixel ceiling (decompression bombs)
//!
//! [disks.public]
//! root = "storage/app/public"
//! url = "/storage"
//!
//! [processing]
//! max_processes = 4           # Max parallel workers (omit for auto = CPU cores)
//! job_timeout_secs = 120      # Wall-clock budget per generation job
//! ```
//!
//! The config is loaded once at startup. Every violation is a
//! [`ConfigError`]; there is no per-request recovery from a bad ladder.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Immutable derivative settings, threaded into every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Key into [`Config::disks`] naming the backend sources live on.
    pub disk: String,
    /// Output root for derivatives, relative to the disk root.
    pub folder: String,
    /// WebP encoding quality (1 = worst, 100 = best).
    pub quality: u32,
    /// WebP compression method (0 = fastest, 6 = slowest/smallest).
    pub effort: u32,
    /// Drop ICC profile and EXIF from every rendition.
    pub strip_metadata: bool,
    /// Target widths, strictly increasing.
    pub ladder: Vec<u32>,
    /// Largest decoded pixel count accepted before allocating a bitmap.
    pub max_pixels: u64,
    /// Available storage backends.
    pub disks: BTreeMap<String, DiskConfig>,
    /// Worker pool settings.
    pub processing: ProcessingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut disks = BTreeMap::new();
        disks.insert("public".to_string(), DiskConfig::default());
        Self {
            disk: "public".to_string(),
            folder: "derivatives".to_string(),
            quality: 80,
            effort: 4,
            strip_metadata: true,
            ladder: vec![160, 320, 640, 960, 1280, 1920],
            max_pixels: 100_000_000,
            disks,
            processing: ProcessingConfig::default(),
        }
    }
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.quality) {
            return Err(ConfigError::Validation("quality must be 1-100".into()));
        }
        if self.effort > 6 {
            return Err(ConfigError::Validation("effort must be 0-6".into()));
        }
        if self.ladder.is_empty() {
            return Err(ConfigError::Validation("ladder must not be empty".into()));
        }
        if self.ladder[0] == 0 {
            return Err(ConfigError::Validation(
                "ladder widths must be positive".into(),
            ));
        }
        if let Some(pair) = self.ladder.windows(2).find(|w| w[0] >= w[1]) {
            return Err(ConfigError::Validation(format!(
                "ladder must be strictly increasing ({} is followed by {})",
                pair[0], pair[1]
            )));
        }
        if self.max_pixels == 0 {
            return Err(ConfigError::Validation("max_pixels must be positive".into()));
        }
        if !self.disks.contains_key(&self.disk) {
            return Err(ConfigError::Validation(format!(
                "disk '{}' is not defined under [disks]",
                self.disk
            )));
        }
        let folder = Path::new(&self.folder);
        if folder.is_absolute()
            || self.folder.starts_with('/')
            || folder
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ConfigError::Validation(
                "folder must be a relative path without '..'".into(),
            ));
        }
        if self.processing.job_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "processing.job_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The disk sources and derivatives are read from and written to.
    pub fn active_disk(&self) -> &DiskConfig {
        // validate() guarantees presence; fall back to defaults for
        // configs built by hand in code.
        self.disks.get(&self.disk).unwrap_or(&DEFAULT_DISK)
    }

    /// Smallest ladder width.
    pub fn smallest_rung(&self) -> u32 {
        self.ladder.first().copied().unwrap_or(0)
    }
}

static DEFAULT_DISK: DiskConfig = DiskConfig {
    root: String::new(),
    url: String::new(),
};

/// A storage backend rooted at a local directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiskConfig {
    /// Directory every disk-relative path is resolved against.
    pub root: String,
    /// Public URL prefix for files on this disk.
    pub url: String,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            root: "storage/app/public".to_string(),
            url: "/storage".to_string(),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel generation workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Wall-clock budget for one generation job.
    pub job_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            job_timeout_secs: 120,
        }
    }
}

impl ProcessingConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`, never below one
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Loading and merging
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(Config::default()).unwrap_or(toml::Value::Table(Default::default()))
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key-by-key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse a TOML string, merge it over the stock defaults and validate.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let overlay: toml::Value = toml::from_str(content)?;
    let merged = merge_toml(stock_defaults_value(), overlay);
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load a config file.
///
/// A missing file yields the validated stock defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Returns a fully-commented stock config file.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pic-ladder configuration
# ========================
# All settings are optional. Values shown below are the defaults.
# Unknown keys cause an error.

# Storage backend (a key under [disks]) holding the uploaded originals.
disk = "public"

# Output root for derivatives, relative to the disk root. Renditions land at
#   {folder}/{dir(source)}/{file_name(source)}-{width}.webp
folder = "derivatives"

# WebP quality (1 = worst, 100 = best).
quality = 80

# WebP compression method (0 = fastest, 6 = slowest but smallest).
effort = 4

# Drop ICC profile and EXIF from renditions.
strip_metadata = true

# Target widths in pixels. Must be strictly increasing.
# Widths above the original are never generated. Changing the ladder does
# not delete old rungs; re-run with --force to rewrite the current ones.
ladder = [160, 320, 640, 960, 1280, 1920]

# Originals decoding to more pixels than this are rejected before allocation.
max_pixels = 100000000

# ---------------------------------------------------------------------------
# Storage backends
# ---------------------------------------------------------------------------
[disks.public]
root = "storage/app/public"
url = "/storage"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel generation workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Wall-clock budget per generation job, in seconds.
job_timeout_secs = 120
"##
}
