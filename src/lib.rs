//! # pic-ladder
//!
//! Responsive WebP rendition ladders for images embedded in structured
//! editor content. Content is scanned for image references, each referenced
//! original gets a fixed ladder of resized WebP renditions, and templates
//! ask for a `srcset` built from whichever renditions exist.
//!
//! # Architecture: Save Time vs. Render Time
//!
//! ```text
//! save:    content fields → scan → union/dedup → queue → worker pool → storage
//! render:  source path → srcset resolver → existing rungs → "url 120w, url 160w"
//! ```
//!
//! The two halves only meet in storage. Rendering never triggers generation,
//! and generation never needs to know who will render.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Polymorphic content scanner: editor trees, repeaters, HTML, JSON text → `PathSet` |
//! | [`naming`] | Canonical `SourcePath` and the deterministic derivative path |
//! | [`config`] | `pic-ladder.toml` loading, stock defaults merge, validation |
//! | [`storage`] | `Storage` trait and the local-disk backend with atomic writes |
//! | [`imaging`] | Backend trait, pure dimension math, `image` + libwebp backend |
//! | [`process`] | Generation of one source's ladder: decode once, skip existing rungs |
//! | [`queue`] | Generation requests, the rayon worker pool and its event stream |
//! | [`dispatch`] | Extract from many content fields, enqueue one request per unique path |
//! | [`srcset`] | Read-only `srcset` resolution for templates |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Paths, Not Hashes
//!
//! A rendition's location is a pure function of the source path and width:
//! `{folder}/{dir}/{file_name}-{width}.webp`. No index or manifest is kept. The
//! resolver finds renditions with `exists` checks, and "already generated"
//! means "file present". Replacing an original under the same path therefore
//! needs a forced regeneration.
//!
//! ## Never Upscale
//!
//! Ladder widths above the original are dropped. An original narrower than
//! the smallest rung gets exactly one rendition at its own width, so every
//! upload has at least one WebP.
//!
//! ## Atomic Writes Instead of Locks
//!
//! Workers write into a temp file next to the destination and rename it into
//! place. Readers see the old file or the new one, never a torn write, and
//! two workers racing on the same rung both produce a complete file.

pub mod config;
pub mod dispatch;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod queue;
pub mod scan;
pub mod srcset;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_helpers;
