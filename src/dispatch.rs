//! Glue between content saves and the generation queue.
//!
//! A record usually has several content fields (body, sidebar, hero
//! repeater). Each is scanned, the results are unioned into one
//! [`PathSet`], and exactly one [`GenerationRequest`] goes out per unique
//! source, however many fields or blocks mention it.

use crate::naming::{PathRejection, SourcePath};
use crate::queue::{GenerationRequest, JobQueue, QueueError};
use crate::scan::{PathSet, extract_pics_paths};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Not a local image path: {0}")]
    Rejected(#[from] PathRejection),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Union of the image paths found in every value.
pub fn collect_content_paths<'a>(values: impl IntoIterator<Item = &'a Value>) -> PathSet {
    values
        .into_iter()
        .flat_map(extract_pics_paths)
        .collect()
}

/// Enqueue generation of an already canonical source. Every request leaves
/// through here.
pub fn enqueue_source(
    queue: &impl JobQueue,
    source: &SourcePath,
    force: bool,
) -> Result<(), QueueError> {
    queue.enqueue(GenerationRequest {
        source: source.clone(),
        force,
    })?;
    debug!(source = %source, force, "queued");
    Ok(())
}

/// Normalize one raw path and enqueue its generation.
///
/// Returns the canonical path that was queued.
pub fn dispatch_generation(
    queue: &impl JobQueue,
    path: &str,
    force: bool,
) -> Result<SourcePath, DispatchError> {
    let source = SourcePath::parse(path)?;
    enqueue_source(queue, &source, force)?;
    Ok(source)
}

/// Scan every content value and enqueue one request per unique image.
///
/// Returns how many requests were queued.
pub fn queue_content_image_derivatives<'a>(
    queue: &impl JobQueue,
    values: impl IntoIterator<Item = &'a Value>,
    force: bool,
) -> Result<usize, DispatchError> {
    let paths = collect_content_paths(values);
    for source in &paths {
        enqueue_source(queue, source, force)?;
    }
    info!(count = paths.len(), force, "content images queued");
    Ok(paths.len())
}
