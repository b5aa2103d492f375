//! Streams a remote resource into a local file under network, size and
//! time limits.

use std::error::Error as StdError;
use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use percent_encoding::percent_decode_str;
use reqwest::Url;
use reqwest::header::CONTENT_DISPOSITION;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::address_policy::BlockedAddress;
use super::config::FetchConfig;
use super::content_disposition::parse_filename;
use super::resolver::ResolveTimeout;
use super::transport::literal_address;
use crate::domain::entities::FetchResult;
use crate::domain::errors::ProxyError;
use crate::domain::ports::MediaFetchPort;

/// Longest accepted URL, in bytes.
pub const MAX_URL_LENGTH: usize = 8 * 1024;

const UNKNOWN_FILENAME: &str = "unknown";

/// HTTP(S) fetcher enforcing [`FetchConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureFetcher;

impl SecureFetcher {
    /// Creates a fetcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn download(
        url: &str,
        dest: &Path,
        config: &FetchConfig,
    ) -> Result<FetchResult, ProxyError> {
        let url = parse_url(url)?;
        let host = url.host_str().unwrap_or_default().to_string();

        if !config.is_proxied()
            && let Some(address) = literal_address(&url)
        {
            config
                .policy
                .check(&host, address)
                .map_err(|blocked| ProxyError::ForgeryBlocked {
                    address: blocked.address,
                })?;
        }

        debug!(url = %url, "Fetching");

        let request = config.transport.client().get(url.clone()).send();
        let response = tokio::time::timeout(config.stage_timeout, request)
            .await
            .map_err(|_| ProxyError::Timeout {
                stage: "response headers",
            })?
            .map_err(classify)?;

        if !config.is_proxied()
            && let Some(peer) = response.remote_addr()
        {
            config.policy.check(&host, peer.ip()).map_err(|blocked| {
                warn!(address = %blocked.address, "Connected peer is not permitted");
                ProxyError::ForgeryBlocked {
                    address: blocked.address,
                }
            })?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::UpstreamHttp {
                status: status.as_u16(),
                reason: reason_phrase(&response),
            });
        }

        if let Some(declared) = response.content_length()
            && declared > config.max_size
        {
            return Err(ProxyError::SizeExceeded {
                size: declared,
                max: config.max_size,
            });
        }

        let mut filename = filename_from_url(&url);
        if let Some(value) = response.headers().get(CONTENT_DISPOSITION) {
            match value.to_str().map_err(|e| e.to_string()).and_then(|v| {
                parse_filename(v).map_err(|e| e.to_string())
            }) {
                Ok(Some(name)) => filename = name,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Ignoring malformed Content-Disposition"),
            }
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify)?;
            let next = written + chunk.len() as u64;
            if next > config.max_size {
                return Err(ProxyError::SizeExceeded {
                    size: next,
                    max: config.max_size,
                });
            }
            file.write_all(&chunk).await?;
            written = next;
        }
        file.flush().await?;

        info!(url = %url, bytes = written, filename = %filename, "Download finished");

        Ok(FetchResult {
            path: dest.to_path_buf(),
            filename,
            byte_count: written,
        })
    }
}

#[async_trait]
impl MediaFetchPort for SecureFetcher {
    type Config = FetchConfig;

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        config: &Self::Config,
    ) -> Result<FetchResult, ProxyError> {
        tokio::time::timeout(config.operation_timeout, Self::download(url, dest, config))
            .await
            .map_err(|_| ProxyError::Timeout { stage: "operation" })?
    }
}

fn parse_url(raw: &str) -> Result<Url, ProxyError> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(ProxyError::invalid_input(format!(
            "url too long: {} bytes (max {MAX_URL_LENGTH})",
            raw.len()
        )));
    }
    let url = Url::parse(raw).map_err(|e| ProxyError::invalid_input(format!("invalid url: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::invalid_input(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ProxyError::invalid_input("url has no host"));
    }
    Ok(url)
}

/// Last non-empty path segment, percent-decoded.
fn filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_FILENAME.to_string())
}

/// The upstream's own reason phrase, else the standard one.
fn reason_phrase(response: &reqwest::Response) -> String {
    response
        .extensions()
        .get::<hyper::ext::ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| response.status().canonical_reason().map(String::from))
        .unwrap_or_else(|| "Unknown".to_string())
}

fn classify(err: reqwest::Error) -> ProxyError {
    if let Some(blocked) = find_source::<BlockedAddress>(&err) {
        return ProxyError::ForgeryBlocked {
            address: blocked.address,
        };
    }
    if find_source::<ResolveTimeout>(&err).is_some() {
        return ProxyError::Timeout { stage: "dns" };
    }
    if err.is_timeout() {
        let stage = if err.is_connect() { "connect" } else { "read" };
        return ProxyError::Timeout { stage };
    }
    ProxyError::transport(err.to_string())
}

fn find_source<'a, E: StdError + 'static>(err: &'a (dyn StdError + 'static)) -> Option<&'a E> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<E>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::FetchSettings;
    use crate::domain::errors::StatusError;
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;
    use test_case::test_case;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
        for (name, value) in headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        let mut out = out.into_bytes();
        out.extend_from_slice(body);
        out
    }

    async fn serve_once(raw: Vec<u8>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(&raw).await;
                let _ = socket.shutdown().await;
            }
        });
        addr
    }

    /// Accepts connections until the test ends, answering each with `raw`.
    fn serve_repeatedly(listener: TcpListener, raw: Vec<u8>) {
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let raw = raw.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(&raw).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
    }

    fn loopback_settings(max_size: u64) -> FetchSettings {
        FetchSettings {
            allowed_private_networks: vec!["127.0.0.0/8".to_string()],
            max_size,
            stage_timeout_secs: 5,
            operation_timeout_secs: 10,
            ..FetchSettings::default()
        }
    }

    fn loopback_config(max_size: u64) -> FetchConfig {
        FetchConfig::from_settings(&loopback_settings(max_size)).unwrap()
    }

    fn timed_config(stage_secs: u64, operation_secs: u64) -> FetchConfig {
        FetchConfig::from_settings(&FetchSettings {
            stage_timeout_secs: stage_secs,
            operation_timeout_secs: operation_secs,
            ..loopback_settings(1 << 20)
        })
        .unwrap()
    }

    fn strict_config() -> FetchConfig {
        FetchConfig::from_settings(&FetchSettings::default()).unwrap()
    }

    #[test_case("https://example.com/a/b/cat%20pic.png", "cat pic.png" ; "decoded_last_segment")]
    #[test_case("https://example.com/a/b/", "b" ; "trailing_slash")]
    #[test_case("https://example.com/", "unknown" ; "root")]
    #[test_case("https://example.com", "unknown" ; "no_path")]
    fn test_filename_from_url(url: &str, expected: &str) {
        assert_eq!(filename_from_url(&Url::parse(url).unwrap()), expected);
    }

    #[test_case("ftp://example.com/a.png" ; "ftp")]
    #[test_case("file:///etc/passwd" ; "file")]
    #[test_case("not a url" ; "garbage")]
    #[test_case("" ; "empty")]
    fn test_parse_url_rejects(url: &str) {
        assert!(matches!(parse_url(url), Err(ProxyError::InvalidInput { .. })));
    }

    #[test]
    fn test_parse_url_length_limit() {
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(matches!(parse_url(&long), Err(ProxyError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_fetch_writes_body() {
        let addr = serve_once(response("200 OK", &[("Content-Length", "5")], b"hello")).await;
        let dir = tempdir().unwrap();
        let dest = dir.path().join("body");

        let result = SecureFetcher::new()
            .fetch(&format!("http://{addr}/files/greeting.txt"), &dest, &loopback_config(1024))
            .await
            .unwrap();

        assert_eq!(result.byte_count, 5);
        assert_eq!(result.filename, "greeting.txt");
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_content_disposition_overrides_filename() {
        let addr = serve_once(response(
            "200 OK",
            &[
                ("Content-Length", "2"),
                ("Content-Disposition", "attachment; filename*=UTF-8''%E7%8C%AB.png"),
            ],
            b"ok",
        ))
        .await;
        let dir = tempdir().unwrap();

        let result = SecureFetcher::new()
            .fetch(&format!("http://{addr}/download"), &dir.path().join("f"), &loopback_config(1024))
            .await
            .unwrap();

        assert_eq!(result.filename, "猫.png");
    }

    #[tokio::test]
    async fn test_malformed_content_disposition_is_not_fatal() {
        let addr = serve_once(response(
            "200 OK",
            &[("Content-Length", "2"), ("Content-Disposition", "attachment; filename=\"open")],
            b"ok",
        ))
        .await;
        let dir = tempdir().unwrap();

        let result = SecureFetcher::new()
            .fetch(&format!("http://{addr}/kept.bin"), &dir.path().join("f"), &loopback_config(1024))
            .await
            .unwrap();

        assert_eq!(result.filename, "kept.bin");
    }

    #[tokio::test]
    async fn test_literal_private_address_blocked() {
        let addr = serve_once(response("200 OK", &[("Content-Length", "5")], b"hello")).await;
        let dir = tempdir().unwrap();
        let dest = dir.path().join("body");

        let err = SecureFetcher::new()
            .fetch(&format!("http://{addr}/x"), &dest, &strict_config())
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::ForgeryBlocked { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_resolved_private_address_blocked() {
        let addr = serve_once(response("200 OK", &[("Content-Length", "5")], b"hello")).await;
        let dir = tempdir().unwrap();
        let dest = dir.path().join("body");

        let err = SecureFetcher::new()
            .fetch(&format!("http://localhost:{}/x", addr.port()), &dest, &strict_config())
            .await
            .unwrap_err();

        assert!(err.is_fetch_error());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_declared_length_over_limit() {
        let body = vec![0u8; 64];
        let addr = serve_once(response("200 OK", &[("Content-Length", "64")], &body)).await;
        let dir = tempdir().unwrap();
        let dest = dir.path().join("body");

        let err = SecureFetcher::new()
            .fetch(&format!("http://{addr}/big"), &dest, &loopback_config(16))
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::SizeExceeded { size: 64, max: 16 }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_streamed_length_over_limit() {
        let body = vec![7u8; 4096];
        let addr = serve_once(response("200 OK", &[], &body)).await;
        let dir = tempdir().unwrap();
        let dest = dir.path().join("body");

        let err = SecureFetcher::new()
            .fetch(&format!("http://{addr}/big"), &dest, &loopback_config(1000))
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::SizeExceeded { max: 1000, .. }));
        let written = std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);
        assert!(written <= 1000);
    }

    #[tokio::test]
    async fn test_upstream_status_propagated_before_size() {
        let addr = serve_once(response("404 Not Found", &[("Content-Length", "4096")], &[0u8; 4096])).await;
        let dir = tempdir().unwrap();

        let err = SecureFetcher::new()
            .fetch(&format!("http://{addr}/gone"), &dir.path().join("f"), &loopback_config(16))
            .await
            .unwrap_err();

        match err {
            ProxyError::UpstreamHttp { status, reason } => {
                assert_eq!(status, 404);
                assert_eq!(reason, "Not Found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upstream_reason_phrase_kept() {
        let addr = serve_once(response("404 Gone Fishing", &[("Content-Length", "0")], b"")).await;
        let dir = tempdir().unwrap();

        let err = SecureFetcher::new()
            .fetch(&format!("http://{addr}/gone"), &dir.path().join("f"), &loopback_config(16))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProxyError::UpstreamHttp { status: 404, ref reason } if reason == "Gone Fishing"
        ));
    }

    #[tokio::test]
    async fn test_stalled_headers_time_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
        });
        let dir = tempdir().unwrap();
        let started = Instant::now();

        let err = SecureFetcher::new()
            .fetch(&format!("http://{addr}/slow"), &dir.path().join("f"), &timed_config(1, 30))
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::Timeout { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_trickling_body_hits_operation_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = response("200 OK", &[("Content-Length", "100000")], b"");
                let _ = socket.write_all(&head).await;
                for _ in 0..100 {
                    if socket.write_all(b"x").await.is_err() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            }
        });
        let dir = tempdir().unwrap();
        let started = Instant::now();

        let err = SecureFetcher::new()
            .fetch(&format!("http://{addr}/drip"), &dir.path().join("f"), &timed_config(1, 2))
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::Timeout { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_redirect_to_private_literal_blocked() {
        let addr = serve_once(response(
            "302 Found",
            &[("Location", "http://10.0.0.1/secret"), ("Content-Length", "0")],
            b"",
        ))
        .await;
        let dir = tempdir().unwrap();
        let dest = dir.path().join("body");

        let err = SecureFetcher::new()
            .fetch(&format!("http://{addr}/hop"), &dest, &loopback_config(1024))
            .await
            .unwrap_err();

        assert!(
            matches!(err, ProxyError::ForgeryBlocked { address } if address == "10.0.0.1".parse::<std::net::IpAddr>().unwrap()),
            "{err:?}"
        );
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_redirect_between_permitted_hosts_followed() {
        let target = serve_once(response("200 OK", &[("Content-Length", "4")], b"moon")).await;
        let location = format!("http://{target}/final");
        let hop = serve_once(response(
            "302 Found",
            &[("Location", location.as_str()), ("Content-Length", "0")],
            b"",
        ))
        .await;
        let dir = tempdir().unwrap();
        let dest = dir.path().join("body");

        let result = SecureFetcher::new()
            .fetch(&format!("http://{hop}/start.txt"), &dest, &loopback_config(1024))
            .await
            .unwrap();

        assert_eq!(result.byte_count, 4);
        assert_eq!(std::fs::read(&dest).unwrap(), b"moon");
    }

    #[tokio::test]
    async fn test_redirect_loop_stops_at_limit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let location = format!("http://{addr}/again");
        serve_repeatedly(
            listener,
            response("302 Found", &[("Location", location.as_str()), ("Content-Length", "0")], b""),
        );
        let config = FetchConfig::from_settings(&FetchSettings {
            max_redirects: 2,
            ..loopback_settings(1024)
        })
        .unwrap();
        let dir = tempdir().unwrap();

        let err = SecureFetcher::new()
            .fetch(&format!("http://{addr}/start"), &dir.path().join("f"), &config)
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::Transport { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_redirect_to_other_scheme_is_error() {
        let addr = serve_once(response(
            "302 Found",
            &[("Location", "ftp://files.example/a.png"), ("Content-Length", "0")],
            b"",
        ))
        .await;
        let dir = tempdir().unwrap();

        let err = SecureFetcher::new()
            .fetch(&format!("http://{addr}/hop"), &dir.path().join("f"), &loopback_config(1024))
            .await
            .unwrap_err();

        assert!(matches!(err, ProxyError::Transport { .. }), "{err:?}");
        assert!(StatusError::from(err).status_code() >= 500);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("connect failed")]
    struct Wrapper(#[source] BlockedAddress);

    #[test]
    fn test_find_source_walks_chain() {
        let blocked = BlockedAddress {
            host: "h".to_string(),
            address: "10.0.0.1".parse().unwrap(),
        };
        let wrapped = Wrapper(blocked.clone());
        assert_eq!(find_source::<BlockedAddress>(&wrapped), Some(&blocked));
        assert!(find_source::<ResolveTimeout>(&wrapped).is_none());
    }
}
