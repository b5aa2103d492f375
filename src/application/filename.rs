//! Response filenames.

use std::sync::OnceLock;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;

/// RFC 8187 `attr-char` minus alphanumerics.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("Invalid regex"))
}

/// Appends `.ext` unless the name already ends with it. `jpeg` satisfies
/// `jpg` and `tiff` satisfies `tif`. A missing extension becomes `.unknown`.
#[must_use]
pub fn correct_filename(filename: &str, extension: Option<&str>) -> String {
    let dot_ext = extension.map_or_else(|| ".unknown".to_string(), |ext| format!(".{ext}"));

    if filename.ends_with(&dot_ext)
        || (extension == Some("jpg") && filename.ends_with(".jpeg"))
        || (extension == Some("tif") && filename.ends_with(".tiff"))
    {
        return filename.to_string();
    }
    format!("{filename}{dot_ext}")
}

/// `Content-Disposition: inline` value.
///
/// The quoted `filename` is an ASCII fallback with every character outside
/// `[A-Za-z0-9_.-]` replaced by `_`. When that differs from the real name,
/// `filename*` carries the UTF-8 original.
#[must_use]
pub fn inline_disposition(filename: &str) -> String {
    let fallback = unsafe_chars().replace_all(filename, "_");

    if fallback == filename {
        return format!("inline; filename=\"{filename}\"");
    }
    format!(
        "inline; filename=\"{fallback}\"; filename*=UTF-8''{}",
        utf8_percent_encode(filename, ATTR_CHAR)
    )
}
