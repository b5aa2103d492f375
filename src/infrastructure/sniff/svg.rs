//! SVG grammar check.
//!
//! Signature matching cannot tell SVG apart from other XML, and SVG without
//! an XML declaration has no signature at all, so documents are parsed and
//! the root element is inspected.

use std::path::Path;

use roxmltree::{Document, ParsingOptions};
use tracing::trace;

/// Files larger than this are never treated as SVG.
pub const SVG_CHECK_LIMIT: u64 = 1024 * 1024;

const MAX_XML_NODES: u32 = 1_000_000;

/// Returns true if the file at `path` is an SVG document.
/// I/O failures count as "not SVG".
#[must_use]
pub fn is_svg_file(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if meta.len() > SVG_CHECK_LIMIT {
        trace!(size = meta.len(), "Skipping SVG check for large file");
        return false;
    }
    std::fs::read(path).is_ok_and(|bytes| is_svg(&bytes))
}

/// Returns true if `bytes` parse as XML with an `svg` root element.
#[must_use]
pub fn is_svg(bytes: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return false;
    };
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut options = ParsingOptions::default();
    options.allow_dtd = true;
    options.nodes_limit = MAX_XML_NODES;

    Document::parse_with_options(text, options)
        .is_ok_and(|doc| doc.root_element().tag_name().name().eq_ignore_ascii_case("svg"))
}
