//! CLI output formatting for every command.
//!
//! Output is **source-centric**: each original is a header line, and what
//! happened to its renditions is listed underneath as indented context
//! lines. Paths on disk are secondary and shown after an arrow.
//!
//! # Output Format
//!
//! ## Extract
//!
//! ```text
//! body.json (2 images)
//!     001 pics/a.jpg
//!     002 pics/b.jpg
//! ```
//!
//! ## Generate / Queue
//!
//! ```text
//! pics/a.jpg
//!     120w: written → derivatives/pics/a.jpg-120.webp
//!     160w: skipped → derivatives/pics/a.jpg-160.webp
//!     240w: failed (IO error on ...) → derivatives/pics/a.jpg-240.webp
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::config::{Config, effective_threads};
use crate::naming::SourcePath;
use crate::process::{RungOutcome, RungStatus};
use crate::queue::JobEvent;
use crate::scan::ScanReport;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn count(n: usize, singular: &str, plural: &str) -> String {
    format!("{} {}", n, if n == 1 { singular } else { plural })
}

fn rung_line(rung: &RungOutcome) -> String {
    let status = match &rung.status {
        RungStatus::Written => "written".to_string(),
        RungStatus::Skipped => "skipped".to_string(),
        RungStatus::Failed(reason) => format!("failed ({reason})"),
    };
    format!(
        "{}{}w: {} → {}",
        indent(1),
        rung.width,
        status,
        rung.output_path
    )
}

// ============================================================================
// extract
// ============================================================================

/// Paths found in one content file.
pub fn format_extract(label: &str, report: &ScanReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} ({})",
        label,
        count(report.paths.len(), "image", "images")
    )];
    for (i, path) in report.paths.iter().enumerate() {
        lines.push(format!("{}{} {}", indent(1), format_index(i + 1), path));
    }
    if report.rejected > 0 {
        lines.push(format!(
            "{}Skipped: {}",
            indent(1),
            count(
                report.rejected,
                "external or invalid reference",
                "external or invalid references"
            )
        ));
    }
    if report.truncated > 0 {
        lines.push(format!(
            "{}Truncated: {} nested too deep",
            indent(1),
            count(report.truncated, "branch", "branches")
        ));
    }
    lines
}

pub fn print_extract(label: &str, report: &ScanReport) {
    for line in format_extract(label, report) {
        println!("{}", line);
    }
}

// ============================================================================
// generate
// ============================================================================

/// One source and the fate of each of its rungs.
pub fn format_generate(source: &SourcePath, rungs: &[RungOutcome]) -> Vec<String> {
    let mut lines = vec![source.to_string()];
    lines.extend(rungs.iter().map(rung_line));
    lines
}

pub fn print_generate(source: &SourcePath, rungs: &[RungOutcome]) {
    for line in format_generate(source, rungs) {
        println!("{}", line);
    }
}

// ============================================================================
// queue
// ============================================================================

/// Lines for one worker pool event. `Started` is silent: a source is
/// printed once, when its outcome is known.
pub fn format_job_event(event: &JobEvent) -> Vec<String> {
    match event {
        JobEvent::Started { .. } => Vec::new(),
        JobEvent::Finished {
            source,
            rungs,
            elapsed,
        } => {
            let mut lines = vec![format!("{} ({} ms)", source, elapsed.as_millis())];
            lines.extend(rungs.iter().map(rung_line));
            lines
        }
        JobEvent::Failed { source, error } => {
            vec![
                source.to_string(),
                format!("{}Error: {}", indent(1), error),
            ]
        }
    }
}

// ============================================================================
// srcset
// ============================================================================

pub fn format_srcset(source: &SourcePath, srcset: Option<&str>) -> Vec<String> {
    match srcset {
        Some(srcset) => vec![srcset.to_string()],
        None => vec![format!(
            "No renditions for {source} yet; templates fall back to the original"
        )],
    }
}

// ============================================================================
// check
// ============================================================================

/// Effective settings after defaults and validation.
pub fn format_check(config: &Config) -> Vec<String> {
    let disk = config.active_disk();
    let ladder: Vec<String> = config.ladder.iter().map(|w| format!("{w}w")).collect();
    vec![
        "Config".to_string(),
        format!("{}Disk: {} ({} → {})", indent(1), config.disk, disk.root, disk.url),
        format!("{}Folder: {}", indent(1), config.folder),
        format!("{}Ladder: {}", indent(1), ladder.join(", ")),
        format!(
            "{}WebP: quality {}, effort {}, {}",
            indent(1),
            config.quality,
            config.effort,
            if config.strip_metadata {
                "metadata stripped"
            } else {
                "metadata kept"
            }
        ),
        format!("{}Max pixels: {}", indent(1), config.max_pixels),
        format!(
            "{}Workers: {}, job timeout {}s",
            indent(1),
            effective_threads(&config.processing),
            config.processing.job_timeout_secs
        ),
    ]
}

pub fn print_check(config: &Config) {
    for line in format_check(config) {
        println!("{}", line);
    }
}
