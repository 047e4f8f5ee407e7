//! Image reference extraction from editor content.
//!
//! Content fields arrive as arbitrary JSON: rich-document trees from the
//! block editor, flat repeater lists, nested objects, or JSON stored as a
//! string. There is no schema to lean on, so the scanner classifies every
//! value into a [`Block`] and lets each variant yield the raw strings it
//! knows about.
//!
//! ## Recognized Shapes
//!
//! ```text
//! {"type": "image",   "attrs": {"src": "pics/a.jpg"}}             → Image
//! {"type": "gallery", "attrs": {"images": ["pics/a.jpg", ...]}}   → Gallery
//! {"type": "slider",  "attrs": {"slides": [{"image": "..."}]}}    → SliderReference
//! {"type": "doc",     "content": [ ...nodes... ]}                 → Container
//! {"type": "quote",   ...}                                        → Node (structural)
//! [{"title": "Hi", "image": "pics/s1.jpg"}, ...]                  → Sequence of Records
//! "<p><img src=\"/storage/pics/c.jpg\"></p>"                      → Html
//! ```
//!
//! Node attributes are looked up under `attrs`, then `data`, then on the node
//! itself, which covers both the tiptap-style and the page-builder style.
//!
//! ## Acceptance
//!
//! Every yielded string goes through [`SourcePath::parse`]: external URLs are
//! dropped and storage/root prefixed spellings collapse into one canonical
//! path, so the result is a set with no duplicates.
//!
//! Recursion stops at [`MAX_DEPTH`]. A branch past that depth is skipped with
//! a warning; the rest of the value is still scanned.

use crate::naming::SourcePath;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Deepest nesting level the scanner descends into.
pub const MAX_DEPTH: usize = 64;

/// Deduplicated result of an extraction.
pub type PathSet = BTreeSet<SourcePath>;

/// Keys on untyped records (repeater rows) that hold an image.
const RECORD_IMAGE_KEYS: &[&str] = &[
    "image",
    "img",
    "picture",
    "pic",
    "photo",
    "src",
    "cover",
    "thumbnail",
];

/// Keys that point at a file once we already know the value is an image.
const FILE_KEYS: &[&str] = &["src", "path", "image", "img", "picture"];

/// Keys on image nodes that may hold the file or a link target. Only values
/// ending in an image extension count.
const LINK_KEYS: &[&str] = &["url", "file"];

/// Keys under which nodes keep their children.
const CHILD_KEYS: &[&str] = &["content", "children", "blocks", "items", "columns"];

/// Extensions that mark a free-standing string as an image reference.
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "tif", "tiff", "bmp", "avif",
];

/// Outcome of scanning one content value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub paths: PathSet,
    /// Branches abandoned at the depth limit.
    pub truncated: usize,
    /// Candidate strings that were not valid source paths (external URLs etc.).
    pub rejected: usize,
}

/// Extract every local image path referenced by `value`.
pub fn extract_pics_paths(value: &Value) -> PathSet {
    scan_content(value).paths
}

/// Like [`extract_pics_paths`] but also reports soft failures.
pub fn scan_content(value: &Value) -> ScanReport {
    let mut scanner = Scanner::default();
    scanner.visit(value, 0, Slot::Root);
    if scanner.report.truncated > 0 {
        warn!(
            truncated = scanner.report.truncated,
            max_depth = MAX_DEPTH,
            "content nesting exceeded the depth limit; deep branches were skipped"
        );
    }
    scanner.report
}

/// One classified content value.
#[derive(Debug)]
enum Block<'a> {
    Image(&'a Map<String, Value>),
    Gallery(&'a Map<String, Value>),
    SliderReference(&'a Map<String, Value>),
    Container(&'a Map<String, Value>),
    /// Typed node we don't know: recurse into everything.
    Node(&'a Map<String, Value>),
    /// Untyped mapping, e.g. a repeater row.
    Record(&'a Map<String, Value>),
    Sequence(&'a [Value]),
    Json(&'a str),
    Html(&'a str),
    Text(&'a str),
    Scalar,
}

impl<'a> Block<'a> {
    fn classify(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => match map.get("type").and_then(Value::as_str) {
                Some(kind) => match kind.to_ascii_lowercase().as_str() {
                    "image" | "img" | "picture" => Block::Image(map),
                    "gallery" | "images" => Block::Gallery(map),
                    "slider" | "slider_ref" | "slider-reference" | "slider_reference"
                    | "carousel" => Block::SliderReference(map),
                    "doc" | "container" | "columns" | "column" | "section" | "group" => {
                        Block::Container(map)
                    }
                    _ => Block::Node(map),
                },
                None => Block::Record(map),
            },
            Value::Array(items) => Block::Sequence(items),
            Value::String(s) => {
                let t = s.trim_start();
                if t.starts_with('{') || t.starts_with('[') {
                    Block::Json(s)
                } else if contains_img_tag(s) {
                    Block::Html(s)
                } else {
                    Block::Text(s)
                }
            }
            _ => Block::Scalar,
        }
    }
}

/// Where a value sits, which decides whether a bare string counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// The field value itself, or an element of a top-level list.
    Root,
    /// A position known to hold an image reference.
    Image,
    /// A link-or-file field on an image node: counts only with an image
    /// extension.
    Link,
    /// Anywhere else.
    Nested,
}

#[derive(Default)]
struct Scanner {
    report: ScanReport,
}

impl Scanner {
    fn visit(&mut self, value: &Value, depth: usize, slot: Slot) {
        if depth > MAX_DEPTH {
            self.report.truncated += 1;
            return;
        }
        let next = depth + 1;

        match Block::classify(value) {
            Block::Image(node) => {
                for key in FILE_KEYS {
                    if let Some(v) = attr(node, key) {
                        self.visit(v, next, Slot::Image);
                    }
                }
                for key in LINK_KEYS {
                    if let Some(v) = attr(node, key) {
                        self.visit(v, next, Slot::Link);
                    }
                }
                self.visit_children(node, next);
            }
            Block::Gallery(node) => {
                for key in ["images", "items", "pictures"] {
                    if let Some(v) = attr(node, key) {
                        self.visit(v, next, Slot::Image);
                    }
                }
                self.visit_children(node, next);
            }
            Block::SliderReference(node) => {
                for key in ["slides", "images"] {
                    if let Some(v) = attr(node, key) {
                        self.visit(v, next, Slot::Image);
                    }
                }
                self.visit_children(node, next);
            }
            Block::Container(node) => {
                self.visit_children(node, next);
                for key in ["attrs", "data"] {
                    if let Some(v) = node.get(key) {
                        self.visit(v, next, Slot::Nested);
                    }
                }
            }
            Block::Node(node) => {
                for (key, v) in node {
                    if key != "type" {
                        self.visit(v, next, Slot::Nested);
                    }
                }
            }
            Block::Record(map) => {
                let in_image = slot == Slot::Image;
                let keys: &[&str] = if in_image { FILE_KEYS } else { RECORD_IMAGE_KEYS };
                let matches = |names: &[&str], key: &str| {
                    names.iter().any(|k| key.eq_ignore_ascii_case(k))
                };
                for (key, v) in map {
                    let child = if matches(keys, key) {
                        Slot::Image
                    } else if in_image && matches(LINK_KEYS, key) {
                        Slot::Link
                    } else {
                        Slot::Nested
                    };
                    self.visit(v, next, child);
                }
            }
            Block::Sequence(items) => {
                // A list in an image slot is a multi-image field; a top-level
                // list may be one too, so both keep their slot.
                let item_slot = if slot == Slot::Nested {
                    Slot::Nested
                } else {
                    slot
                };
                for item in items {
                    self.visit(item, next, item_slot);
                }
            }
            Block::Json(text) => match serde_json::from_str::<Value>(text) {
                Ok(parsed) => self.visit(&parsed, next, slot),
                Err(_) if slot == Slot::Image => self.accept(text),
                Err(_) if slot == Slot::Link && has_image_extension(text) => self.accept(text),
                Err(_) => {}
            },
            Block::Html(html) => {
                for src in img_tag_sources(html) {
                    self.accept(src);
                }
            }
            Block::Text(text) => match slot {
                Slot::Image => self.accept(text),
                Slot::Root | Slot::Link if has_image_extension(text) => self.accept(text),
                _ => {}
            },
            Block::Scalar => {}
        }
    }

    fn visit_children(&mut self, node: &Map<String, Value>, depth: usize) {
        for key in CHILD_KEYS {
            if let Some(children) = node.get(*key) {
                self.visit(children, depth, Slot::Nested);
            }
        }
    }

    fn accept(&mut self, raw: &str) {
        match SourcePath::parse(raw) {
            Ok(path) => {
                self.report.paths.insert(path);
            }
            Err(reason) => {
                debug!(%reason, "skipping image reference");
                self.report.rejected += 1;
            }
        }
    }
}

/// Look up a node attribute under `attrs`, then `data`, then the node itself.
fn attr<'a>(node: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    ["attrs", "data"]
        .iter()
        .filter_map(|container| node.get(*container).and_then(Value::as_object))
        .find_map(|attrs| attrs.get(key))
        .or_else(|| node.get(key))
}

fn has_image_extension(text: &str) -> bool {
    let path = text.split(['?', '#']).next().unwrap_or_default();
    path.rsplit_once('.').is_some_and(|(_, ext)| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
    })
}

fn contains_img_tag(text: &str) -> bool {
    text.to_ascii_lowercase().contains("<img")
}

/// `src` attribute values of every `<img>` tag in an HTML fragment.
fn img_tag_sources(html: &str) -> Vec<&str> {
    // ASCII lowercasing keeps byte offsets, so indices into `lower` are valid in `html`.
    let lower = html.to_ascii_lowercase();
    let mut sources = Vec::new();
    let mut from = 0;

    while let Some(found) = lower[from..].find("<img") {
        let tag_start = from + found;
        let tag_end = lower[tag_start..]
            .find('>')
            .map(|end| tag_start + end)
            .unwrap_or(lower.len());
        let tag = &lower[tag_start..tag_end];

        let mut search = 0;
        while let Some(pos) = tag[search..].find("src=") {
            let attr_start = search + pos;
            let preceded_by_space = tag[..attr_start]
                .chars()
                .next_back()
                .is_some_and(char::is_whitespace);
            let value_start = tag_start + attr_start + "src=".len();
            if preceded_by_space {
                if let Some(value) = attribute_value(&html[value_start..tag_end]) {
                    sources.push(value);
                }
                break;
            }
            search = attr_start + "src=".len();
        }
        from = tag_end;
    }
    sources
}

fn attribute_value(rest: &str) -> Option<&str> {
    let quote = rest.chars().next()?;
    if quote == '"' || quote == '\'' {
        let inner = &rest[1..];
        inner.find(quote).map(|end| &inner[..end])
    } else {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        // `<img src=a.jpg/>`
        let value = rest[..end].trim_end_matches('/');
        (!value.is_empty()).then_some(value)
    }
}
