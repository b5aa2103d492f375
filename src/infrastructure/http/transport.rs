//! HTTP transport construction.

use std::sync::Arc;
use std::time::Duration;

use reqwest::redirect::{Attempt, Policy};
use reqwest::{Client, Proxy, Url};
use tracing::warn;

use super::address_policy::AddressPolicy;
use super::resolver::GuardedResolver;
use super::config::FetchConfigError;

/// Options the transport is built from.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Forwarding proxy. When set, address checks are left to the proxy.
    pub proxy: Option<String>,
    /// DNS, connect/TLS, socket read and response-header timeout.
    pub stage_timeout: Duration,
    /// Ceiling for a whole request including the body.
    pub operation_timeout: Duration,
    /// Redirect hops followed before giving up.
    pub max_redirects: usize,
}

/// A configured HTTP client plus whether it goes through a proxy.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    proxied: bool,
}

impl Transport {
    /// Builds the client.
    ///
    /// Without a proxy the client resolves names through a
    /// [`GuardedResolver`] and refuses redirects to blocked literal
    /// addresses. System proxy variables are never consulted implicitly.
    ///
    /// # Errors
    /// Returns error if the proxy URL is invalid or the client cannot be built.
    pub fn build(
        options: &TransportOptions,
        policy: &Arc<AddressPolicy>,
    ) -> Result<Self, FetchConfigError> {
        let mut builder = Client::builder()
            .user_agent(options.user_agent.clone())
            .connect_timeout(options.stage_timeout)
            .read_timeout(options.stage_timeout)
            .timeout(options.operation_timeout);

        let proxied = options.proxy.is_some();

        if let Some(proxy) = &options.proxy {
            let proxy = Proxy::all(proxy.as_str())
                .map_err(|e| FetchConfigError::InvalidProxy(e.to_string()))?;
            builder = builder
                .proxy(proxy)
                .redirect(Policy::limited(options.max_redirects));
        } else {
            builder = builder
                .no_proxy()
                .dns_resolver(Arc::new(GuardedResolver::new(
                    policy.clone(),
                    options.stage_timeout,
                )))
                .redirect(guarded_redirects(policy.clone(), options.max_redirects));
        }

        let client = builder
            .build()
            .map_err(|e| FetchConfigError::Client(e.to_string()))?;

        Ok(Self { client, proxied })
    }

    /// Returns the HTTP client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Returns true if requests go through a forwarding proxy.
    #[must_use]
    pub const fn is_proxied(&self) -> bool {
        self.proxied
    }
}

fn guarded_redirects(policy: Arc<AddressPolicy>, max_redirects: usize) -> Policy {
    Policy::custom(move |attempt: Attempt<'_>| {
        if attempt.previous().len() > max_redirects {
            return attempt.error(format!("too many redirects (max {max_redirects})"));
        }
        if !matches!(attempt.url().scheme(), "http" | "https") {
            let scheme = attempt.url().scheme().to_string();
            return attempt.error(format!("redirect to unsupported scheme {scheme}"));
        }
        let url = attempt.url().clone();
        if let Some(address) = literal_address(&url) {
            let host = url.host_str().unwrap_or_default();
            if let Err(blocked) = policy.check(host, address) {
                warn!(address = %address, "Blocked redirect target");
                return attempt.error(blocked);
            }
        }
        attempt.follow()
    })
}

/// Returns the IP for hosts written as address literals. Such hosts never
/// reach the resolver.
#[must_use]
pub fn literal_address(url: &Url) -> Option<std::net::IpAddr> {
    url.host_str()?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(proxy: Option<&str>) -> TransportOptions {
        TransportOptions {
            user_agent: "test".to_string(),
            proxy: proxy.map(String::from),
            stage_timeout: Duration::from_secs(1),
            operation_timeout: Duration::from_secs(2),
            max_redirects: 3,
        }
    }

    #[test]
    fn test_literal_address() {
        let v4 = Url::parse("http://10.0.0.1:8080/a").unwrap();
        let v6 = Url::parse("http://[::1]/a").unwrap();
        let name = Url::parse("https://example.com/a").unwrap();

        assert_eq!(literal_address(&v4), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(literal_address(&v6), Some("::1".parse().unwrap()));
        assert_eq!(literal_address(&name), None);
    }

    #[test]
    fn test_build_direct_and_proxied() {
        let policy = Arc::new(AddressPolicy::strict());
        let direct = Transport::build(&options(None), &policy).unwrap();
        assert!(!direct.is_proxied());

        let proxied = Transport::build(&options(Some("http://proxy.internal:3128")), &policy).unwrap();
        assert!(proxied.is_proxied());
    }

    #[test]
    fn test_invalid_proxy() {
        let policy = Arc::new(AddressPolicy::strict());
        let err = Transport::build(&options(Some("::not a url::")), &policy).unwrap_err();
        assert!(matches!(err, FetchConfigError::InvalidProxy(_)));
    }
}
