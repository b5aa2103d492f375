//! Pipeline outcome to status, headers and body.

use std::path::Path;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_SECURITY_POLICY, CONTENT_TYPE, HeaderMap,
    HeaderValue, InvalidHeaderValue,
};
use tracing::debug;

use crate::application::ProxiedMedia;
use crate::application::ResponseBody;
use crate::application::filename::inline_disposition;
use crate::domain::{ProxyFlags, StatusError};
use crate::infrastructure::config::ResponseSettings;

const CACHE_SUCCESS: &str = "max-age=31536000, immutable";
const CACHE_FAILURE: &str = "max-age=300";
const ALLOWED_METHODS: &str = "GET, OPTIONS";
const PLACEHOLDER_MIME: &str = "image/png";

/// Body of a [`ProxyResponse`].
#[derive(Debug)]
pub enum Body {
    /// No body.
    Empty,
    /// Static bytes, such as the placeholder image.
    Static(Bytes),
    /// Pipeline output.
    Media(ResponseBody),
}

/// A fully mapped response.
#[derive(Debug)]
pub struct ProxyResponse {
    /// Status code.
    pub status: StatusCode,
    /// Headers.
    pub headers: HeaderMap,
    /// Body.
    pub body: Body,
}

/// Image served in place of a failure when the request asks for it.
#[derive(Debug, Clone)]
pub struct Placeholder {
    bytes: Bytes,
    mime: String,
}

impl Placeholder {
    /// Wraps in-memory image bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }

    /// Reads a placeholder from disk. The type is detected from its
    /// signature and defaults to PNG.
    ///
    /// # Errors
    /// Returns error if the file cannot be read.
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let mime = infer::get(&bytes).map_or(PLACEHOLDER_MIME, |kind| kind.mime_type());
        debug!(path = %path.display(), mime, "Loaded placeholder");
        Ok(Self::new(bytes, mime))
    }

    /// Returns the image type.
    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }
}

/// Maps pipeline outcomes to responses.
#[derive(Debug, Clone)]
pub struct Responder {
    allow_origin: HeaderValue,
    allow_headers: HeaderValue,
    content_security_policy: HeaderValue,
    placeholder: Option<Placeholder>,
}

impl Responder {
    /// Creates a responder from the configured header values.
    ///
    /// # Errors
    /// Returns error if a configured value is not a valid header value.
    pub fn new(
        settings: &ResponseSettings,
        placeholder: Option<Placeholder>,
    ) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            allow_origin: HeaderValue::from_str(&settings.allow_origin)?,
            allow_headers: HeaderValue::from_str(&settings.allow_headers)?,
            content_security_policy: HeaderValue::from_str(&settings.content_security_policy)?,
            placeholder,
        })
    }

    /// Response for a request that carries no target URL.
    #[must_use]
    pub fn bad_request(&self) -> ProxyResponse {
        ProxyResponse {
            status: StatusCode::BAD_REQUEST,
            headers: self.base_headers(),
            body: Body::Empty,
        }
    }

    /// Maps the result of one pipeline run.
    #[must_use]
    pub fn respond(
        &self,
        outcome: Result<ProxiedMedia, StatusError>,
        flags: ProxyFlags,
    ) -> ProxyResponse {
        match outcome {
            Ok(media) => self.success(media),
            Err(err) => self.failure(&err, flags),
        }
    }

    fn success(&self, media: ProxiedMedia) -> ProxyResponse {
        let mut headers = self.base_headers();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_SUCCESS));
        headers.insert(CONTENT_TYPE, content_type(&media.mime));
        if let Ok(disposition) = HeaderValue::from_str(&inline_disposition(&media.filename)) {
            headers.insert(CONTENT_DISPOSITION, disposition);
        }

        ProxyResponse {
            status: StatusCode::OK,
            headers,
            body: Body::Media(media.body),
        }
    }

    fn failure(&self, err: &StatusError, flags: ProxyFlags) -> ProxyResponse {
        let mut headers = self.base_headers();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_FAILURE));

        if flags.contains(ProxyFlags::FALLBACK)
            && let Some(placeholder) = &self.placeholder
        {
            headers.insert(CONTENT_TYPE, content_type(&placeholder.mime));
            return ProxyResponse {
                status: StatusCode::OK,
                headers,
                body: Body::Static(placeholder.bytes.clone()),
            };
        }

        let status = if err.is_redirect() || err.is_client_error() {
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        ProxyResponse {
            status,
            headers,
            body: Body::Empty,
        }
    }

    fn base_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(CONTENT_SECURITY_POLICY, self.content_security_policy.clone());
        headers
    }
}

fn content_type(mime: &str) -> HeaderValue {
    HeaderValue::from_str(mime)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn responder(placeholder: Option<Placeholder>) -> Responder {
        Responder::new(&ResponseSettings::default(), placeholder).unwrap()
    }

    fn media() -> ProxiedMedia {
        ProxiedMedia {
            mime: "image/webp".to_string(),
            filename: "cat.png.webp".to_string(),
            body: ResponseBody::Buffer(Bytes::from_static(b"RIFF")),
        }
    }

    fn header<'a>(response: &'a ProxyResponse, name: reqwest::header::HeaderName) -> Option<&'a str> {
        response.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_success_headers() {
        let response = responder(None).respond(Ok(media()), ProxyFlags::empty());

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(header(&response, CONTENT_TYPE), Some("image/webp"));
        assert_eq!(header(&response, CACHE_CONTROL), Some(CACHE_SUCCESS));
        assert_eq!(
            header(&response, CONTENT_DISPOSITION),
            Some("inline; filename=\"cat.png.webp\"")
        );
        assert_eq!(header(&response, ACCESS_CONTROL_ALLOW_ORIGIN), Some("*"));
        assert!(matches!(response.body, Body::Media(ResponseBody::Buffer(_))));
    }

    #[test]
    fn test_bad_request_has_no_cache_header() {
        let response = responder(None).bad_request();

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.headers.get(CACHE_CONTROL).is_none());
        assert_eq!(header(&response, ACCESS_CONTROL_ALLOW_METHODS), Some(ALLOWED_METHODS));
        assert!(matches!(response.body, Body::Empty));
    }

    #[test_case(404, 404 ; "not_found_passes")]
    #[test_case(403, 403 ; "forbidden_passes")]
    #[test_case(302, 302 ; "redirect_passes")]
    #[test_case(503, 500 ; "upstream_server_error_hidden")]
    #[test_case(500, 500 ; "internal")]
    fn test_failure_status(code: u16, expected: u16) {
        let response =
            responder(None).respond(Err(StatusError::new("x", code)), ProxyFlags::empty());

        assert_eq!(response.status.as_u16(), expected);
        assert_eq!(header(&response, CACHE_CONTROL), Some(CACHE_FAILURE));
        assert!(response.headers.get(CONTENT_TYPE).is_none());
        assert!(matches!(response.body, Body::Empty));
    }

    #[test]
    fn test_fallback_serves_placeholder() {
        let placeholder = Placeholder::new(Bytes::from_static(b"\x89PNG"), "image/png");
        let response = responder(Some(placeholder))
            .respond(Err(StatusError::internal()), ProxyFlags::FALLBACK);

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(header(&response, CONTENT_TYPE), Some("image/png"));
        assert_eq!(header(&response, CACHE_CONTROL), Some(CACHE_FAILURE));
        assert!(matches!(response.body, Body::Static(ref b) if b.as_ref() == b"\x89PNG"));
    }

    #[test]
    fn test_fallback_without_placeholder_uses_status() {
        let response = responder(None)
            .respond(Err(StatusError::new("Rejected type", 403)), ProxyFlags::FALLBACK);
        assert_eq!(response.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_custom_headers() {
        let settings = ResponseSettings {
            allow_origin: "https://app.example".to_string(),
            ..ResponseSettings::default()
        };
        let response = Responder::new(&settings, None).unwrap().bad_request();
        assert_eq!(
            header(&response, ACCESS_CONTROL_ALLOW_ORIGIN),
            Some("https://app.example")
        );
    }

    #[test]
    fn test_invalid_header_value_rejected() {
        let settings = ResponseSettings {
            content_security_policy: "bad\nvalue".to_string(),
            ..ResponseSettings::default()
        };
        assert!(Responder::new(&settings, None).is_err());
    }

    #[tokio::test]
    async fn test_placeholder_load_detects_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dummy");
        tokio::fs::write(&path, b"GIF89a\x01\x00\x01\x00\x00\x00\x00;")
            .await
            .unwrap();

        let placeholder = Placeholder::load(&path).await.unwrap();
        assert_eq!(placeholder.mime(), "image/gif");
    }

    #[tokio::test]
    async fn test_placeholder_defaults_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dummy");
        tokio::fs::write(&path, b"opaque").await.unwrap();

        let placeholder = Placeholder::load(&path).await.unwrap();
        assert_eq!(placeholder.mime(), "image/png");
    }
}
