//! DNS resolver that only hands permitted addresses to the connector.
//!
//! The HTTP client connects to exactly the addresses returned here.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use thiserror::Error;
use tracing::{debug, warn};

use super::address_policy::AddressPolicy;

/// DNS lookup did not finish in time.
#[derive(Debug, Clone, Error)]
#[error("dns lookup for {host} timed out after {timeout:?}")]
pub struct ResolveTimeout {
    /// Host being resolved.
    pub host: String,
    /// Configured lookup timeout.
    pub timeout: Duration,
}

/// Resolver enforcing an [`AddressPolicy`].
#[derive(Debug, Clone)]
pub struct GuardedResolver {
    policy: Arc<AddressPolicy>,
    timeout: Duration,
}

impl GuardedResolver {
    /// Creates a resolver with a per-lookup timeout.
    #[must_use]
    pub const fn new(policy: Arc<AddressPolicy>, timeout: Duration) -> Self {
        Self { policy, timeout }
    }

    /// Resolves `host` and applies the policy.
    ///
    /// Any blocked address fails the whole lookup so that a name mixing
    /// public and internal records cannot be used to reach the latter.
    ///
    /// # Errors
    /// Returns lookup, timeout or policy errors.
    pub async fn lookup(
        &self,
        host: &str,
    ) -> Result<Vec<SocketAddr>, Box<dyn std::error::Error + Send + Sync>> {
        let addrs: Vec<SocketAddr> =
            tokio::time::timeout(self.timeout, tokio::net::lookup_host((host, 0)))
                .await
                .map_err(|_| ResolveTimeout {
                    host: host.to_string(),
                    timeout: self.timeout,
                })??
                .collect();

        for addr in &addrs {
            if let Err(blocked) = self.policy.check(host, addr.ip()) {
                warn!(host, address = %addr.ip(), "Blocked address");
                return Err(Box::new(blocked));
            }
        }

        debug!(host, count = addrs.len(), "Resolved host");
        Ok(addrs)
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let addrs = resolver.lookup(name.as_str()).await?;
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}
