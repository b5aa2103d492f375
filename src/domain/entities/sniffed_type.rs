//! Content type classification produced by sniffing.

/// MIME type reported for anything that is not positively identified.
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// MIME type for SVG documents.
pub const MIME_SVG: &str = "image/svg+xml";

/// MIME type reported by signature detection for XML documents.
pub const MIME_XML: &str = "application/xml";

/// Types considered safe to hand to a browser without transformation.
pub const BROWSER_SAFE_TYPES: &[&str] = &[
    // Images
    "image/png",
    "image/gif",
    "image/jpeg",
    "image/webp",
    "image/avif",
    "image/apng",
    "image/bmp",
    "image/tiff",
    "image/x-icon",
    // OggS
    "audio/opus",
    "video/ogg",
    "audio/ogg",
    "application/ogg",
    // ISO base media file format
    "video/quicktime",
    "video/mp4",
    "audio/mp4",
    "video/x-m4v",
    "audio/x-m4a",
    "video/3gpp",
    "video/3gpp2",
    "video/mpeg",
    "audio/mpeg",
    "video/webm",
    "audio/webm",
    "audio/aac",
    "audio/flac",
    "audio/wav",
    // Legacy spellings, canonicalised after the check
    "audio/x-flac",
    "audio/vnd.wave",
];

/// Types the codec backend can decode.
pub const CONVERTIBLE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/apng",
    "image/vnd.mozilla.apng",
    "image/webp",
    "image/svg+xml",
    "image/x-icon",
    "image/bmp",
];

/// Types that go through the animation-preserving decode path.
pub const ANIMATION_CONVERTIBLE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/x-icon",
    "image/bmp",
];

/// Result of content sniffing. Always present; unknown content is
/// reported as [`MIME_OCTET_STREAM`] with no extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SniffedType {
    mime: String,
    extension: Option<String>,
}

impl SniffedType {
    /// Creates a sniffed type from a MIME string and optional extension.
    #[must_use]
    pub fn new(mime: impl Into<String>, extension: Option<impl Into<String>>) -> Self {
        Self {
            mime: mime.into(),
            extension: extension.map(Into::into),
        }
    }

    /// Generic binary classification.
    #[must_use]
    pub fn octet_stream() -> Self {
        Self {
            mime: MIME_OCTET_STREAM.to_string(),
            extension: None,
        }
    }

    /// SVG classification.
    #[must_use]
    pub fn svg() -> Self {
        Self {
            mime: MIME_SVG.to_string(),
            extension: Some("svg".to_string()),
        }
    }

    /// Returns the MIME type.
    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Returns the file extension without the leading dot.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Returns true for the generic binary classification.
    #[must_use]
    pub fn is_octet_stream(&self) -> bool {
        self.mime == MIME_OCTET_STREAM
    }

    /// Returns true if the type is exactly SVG.
    #[must_use]
    pub fn is_svg(&self) -> bool {
        self.mime == MIME_SVG
    }

    /// Returns true if the codec backend can decode this type.
    #[must_use]
    pub fn is_convertible(&self) -> bool {
        CONVERTIBLE_TYPES.contains(&self.mime.as_str())
    }

    /// Returns true if this type uses the animation-preserving path.
    #[must_use]
    pub fn is_animation_convertible(&self) -> bool {
        ANIMATION_CONVERTIBLE_TYPES.contains(&self.mime.as_str())
    }

    /// Returns true if the type may be served as-is.
    #[must_use]
    pub fn is_browser_safe(&self) -> bool {
        is_browser_safe(&self.mime)
    }
}

impl Default for SniffedType {
    fn default() -> Self {
        Self::octet_stream()
    }
}

impl std::fmt::Display for SniffedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.extension {
            Some(ext) => write!(f, "{} (.{ext})", self.mime),
            None => write!(f, "{}", self.mime),
        }
    }
}

/// Returns true if `mime` is on the browser-safe allow-list.
#[must_use]
pub fn is_browser_safe(mime: &str) -> bool {
    BROWSER_SAFE_TYPES.contains(&mime)
}

/// Maps legacy MIME spellings to their canonical form.
#[must_use]
pub fn canonical_mime(mime: &str) -> &str {
    match mime {
        "audio/x-flac" => "audio/flac",
        "audio/vnd.wave" => "audio/wav",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_octet_stream_has_no_extension() {
        let t = SniffedType::octet_stream();
        assert!(t.is_octet_stream());
        assert_eq!(t.extension(), None);
        assert_eq!(SniffedType::default(), t);
    }

    #[test_case("audio/x-flac", "audio/flac" ; "flac")]
    #[test_case("audio/vnd.wave", "audio/wav" ; "wave")]
    #[test_case("image/png", "image/png" ; "unchanged")]
    fn test_canonical_mime(input: &str, expected: &str) {
        assert_eq!(canonical_mime(input), expected);
    }

    #[test]
    fn test_apng_is_convertible_but_not_animation_convertible() {
        let t = SniffedType::new("image/apng", Some("apng"));
        assert!(t.is_convertible());
        assert!(!t.is_animation_convertible());
    }

    #[test]
    fn test_svg_is_convertible_but_not_browser_safe() {
        let t = SniffedType::svg();
        assert!(t.is_svg());
        assert!(t.is_convertible());
        assert!(!t.is_browser_safe());
    }
}
