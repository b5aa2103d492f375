//! Inbound request mapping.

use percent_encoding::percent_decode_str;

use crate::domain::ProxyFlags;

/// Target URL and flags extracted from a request path and query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProxyRequest {
    /// Remote URL. `None` when neither the query nor the path carries one.
    pub url: Option<String>,
    /// Flags present in the query, regardless of value.
    pub flags: ProxyFlags,
}

impl ProxyRequest {
    /// Parses `/path?query`.
    ///
    /// The `url` query parameter wins. Otherwise the path after the leading
    /// slash is taken as a host and path and prefixed with `https://`.
    /// Unknown query keys are ignored.
    #[must_use]
    pub fn parse(path_and_query: &str) -> Self {
        let (path, query) = path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""));

        let mut url = None;
        let mut flags = ProxyFlags::empty();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(key);
            if key == "url" {
                url = Some(decode_component(value));
            } else if let Some(flag) = ProxyFlags::from_query_key(&key) {
                flags |= flag;
            }
        }

        let url = match url {
            Some(url) => Some(url),
            None => {
                let suffix = percent_decode_str(path.trim_start_matches('/')).decode_utf8_lossy();
                (!suffix.is_empty()).then(|| format!("https://{suffix}"))
            }
        }
        .filter(|url| !url.is_empty());

        Self { url, flags }
    }
}

/// Query component decoding: `+` is a space.
fn decode_component(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}
