//! Content-based type detection.

use std::io::Read;
use std::path::Path;

use tracing::{debug, error, warn};

use super::svg::is_svg_file;
use crate::domain::entities::{MIME_XML, SniffedType, canonical_mime, is_browser_safe};

/// Bytes read from the head of a file for signature matching.
pub const SIGNATURE_WINDOW: usize = 8 * 1024;

/// Classifies files by their bytes, ignoring any declared type.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeSniffer;

impl TypeSniffer {
    /// Creates a sniffer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Detects the type of the file at `path` on the blocking pool.
    /// Never fails; anything unidentified is generic binary.
    pub async fn detect(&self, path: &Path) -> SniffedType {
        let path = path.to_path_buf();
        match tokio::task::spawn_blocking(move || detect_file(&path)).await {
            Ok(sniffed) => sniffed,
            Err(e) => {
                error!(error = %e, "Type detection task panicked");
                SniffedType::octet_stream()
            }
        }
    }
}

/// Synchronous detection. Pure function of the file's bytes.
#[must_use]
pub fn detect_file(path: &Path) -> SniffedType {
    let head = match read_head(path) {
        Ok(head) => head,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read file for type detection");
            return SniffedType::octet_stream();
        }
    };

    if head.is_empty() {
        return SniffedType::octet_stream();
    }

    let Some(kind) = infer::get(&head) else {
        if is_svg_file(path) {
            return SniffedType::svg();
        }
        debug!(path = %path.display(), "No signature matched");
        return SniffedType::octet_stream();
    };

    let mime = signature_vocabulary(kind.mime_type());

    // Markup signatures (`<?xml`, `<!--`, `<html`) can all open an SVG.
    if is_markup(mime) && is_svg_file(path) {
        return SniffedType::svg();
    }

    if !is_browser_safe(mime) {
        debug!(mime, "Detected type is not browser-safe");
        return SniffedType::octet_stream();
    }

    SniffedType::new(canonical_mime(mime), Some(kind.extension()))
}

fn is_markup(mime: &str) -> bool {
    mime == MIME_XML || mime.starts_with("text/")
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut head = Vec::with_capacity(SIGNATURE_WINDOW);
    file.take(SIGNATURE_WINDOW as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// Renames signature-matcher MIME strings to the names used by the
/// browser-safe list.
fn signature_vocabulary(mime: &str) -> &str {
    match mime {
        "image/vnd.microsoft.icon" => "image/x-icon",
        "audio/x-wav" => "audio/vnd.wave",
        "audio/m4a" => "audio/x-m4a",
        "text/xml" => MIME_XML,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;
    use test_case::test_case;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(10, 10, image::Rgba([255, 0, 0, 255]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_empty_file_is_octet_stream() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty", b"");
        assert_eq!(detect_file(&path), SniffedType::octet_stream());
    }

    #[test]
    fn test_png_detected_regardless_of_name() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "photo.txt", &png_bytes());
        let sniffed = detect_file(&path);
        assert_eq!(sniffed.mime(), "image/png");
        assert_eq!(sniffed.extension(), Some("png"));
    }

    #[test]
    fn test_svg_without_declaration() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a",
            br#"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="4"/>"#,
        );
        assert_eq!(detect_file(&path), SniffedType::svg());
    }

    #[test]
    fn test_xml_declared_svg() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a",
            br#"<?xml version="1.0" encoding="UTF-8"?><svg xmlns="http://www.w3.org/2000/svg"/>"#,
        );
        assert_eq!(detect_file(&path), SniffedType::svg());
    }

    #[test_case(b"<!-- Generator: Sketch --><svg xmlns=\"http://www.w3.org/2000/svg\" width=\"4\" height=\"4\"/>" ; "leading_comment")]
    #[test_case(b"<!-- a --><!DOCTYPE svg><svg xmlns=\"http://www.w3.org/2000/svg\"/>" ; "comment_then_doctype")]
    fn test_comment_prefixed_svg(bytes: &[u8]) {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a", bytes);
        assert_eq!(detect_file(&path), SniffedType::svg());
    }

    #[test]
    fn test_comment_prefixed_html_downgraded() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a", b"<!-- page --><html><body>hi</body></html>");
        assert!(detect_file(&path).is_octet_stream());
    }

    #[test]
    fn test_generic_xml_downgraded() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a", br#"<?xml version="1.0"?><rss><channel/></rss>"#);
        assert!(detect_file(&path).is_octet_stream());
    }

    #[test_case(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n" ; "pdf")]
    #[test_case(b"MZ\x90\x00\x03\x00\x00\x00\x04\x00\x00\x00\xff\xff" ; "executable")]
    #[test_case(b"PK\x03\x04\x14\x00\x00\x00\x08\x00" ; "zip")]
    #[test_case(b"just some words" ; "plain_text")]
    fn test_unsafe_or_unknown_is_octet_stream(bytes: &[u8]) {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a", bytes);
        assert!(detect_file(&path).is_octet_stream());
    }

    #[test]
    fn test_flac_alias_normalised() {
        let dir = TempDir::new().unwrap();
        let mut bytes = b"fLaC\x00\x00\x00\x22".to_vec();
        bytes.resize(64, 0);
        let path = write(&dir, "a", &bytes);
        assert_eq!(detect_file(&path).mime(), "audio/flac");
    }

    #[test]
    fn test_wave_alias_normalised() {
        let dir = TempDir::new().unwrap();
        let mut bytes = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
        bytes.resize(64, 0);
        let path = write(&dir, "a", &bytes);
        assert_eq!(detect_file(&path).mime(), "audio/wav");
    }

    #[test]
    fn test_detection_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a", &png_bytes());
        assert_eq!(detect_file(&path), detect_file(&path));
    }

    #[test]
    fn test_missing_file_is_octet_stream() {
        assert!(detect_file(Path::new("/nonexistent/file")).is_octet_stream());
    }

    #[tokio::test]
    async fn test_async_detect() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a", &png_bytes());
        let sniffed = TypeSniffer::new().detect(&path).await;
        assert_eq!(sniffed.mime(), "image/png");
    }
}
