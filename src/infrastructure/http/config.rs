//! Immutable per-call fetch configuration.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::address_policy::{AddressPolicy, InvalidNetwork};
use super::transport::{Transport, TransportOptions};
use crate::infrastructure::config::FetchSettings;

/// Fetch configuration could not be built.
#[derive(Debug, Error)]
pub enum FetchConfigError {
    /// Bad allow-list entry.
    #[error(transparent)]
    InvalidNetwork(#[from] InvalidNetwork),
    /// Bad proxy URL.
    #[error("invalid proxy: {0}")]
    InvalidProxy(String),
    /// HTTP client construction failed.
    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Everything a single fetch needs. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Peer address policy.
    pub policy: Arc<AddressPolicy>,
    /// Largest accepted body, in bytes.
    pub max_size: u64,
    /// Response-header timeout.
    pub stage_timeout: Duration,
    /// Whole-fetch timeout.
    pub operation_timeout: Duration,
    /// HTTP transport.
    pub transport: Transport,
}

impl FetchConfig {
    /// Builds the configuration and its transport from file settings.
    ///
    /// # Errors
    /// Returns error if the allow-list or proxy is invalid.
    pub fn from_settings(settings: &FetchSettings) -> Result<Self, FetchConfigError> {
        let policy = Arc::new(AddressPolicy::from_cidrs(
            &settings.allowed_private_networks,
        )?);
        let options = TransportOptions {
            user_agent: settings.user_agent.clone(),
            proxy: settings.proxy.clone().filter(|p| !p.trim().is_empty()),
            stage_timeout: Duration::from_secs(settings.stage_timeout_secs),
            operation_timeout: Duration::from_secs(settings.operation_timeout_secs),
            max_redirects: settings.max_redirects,
        };
        let transport = Transport::build(&options, &policy)?;

        Ok(Self {
            policy,
            max_size: settings.max_size,
            stage_timeout: options.stage_timeout,
            operation_timeout: options.operation_timeout,
            transport,
        })
    }

    /// Returns true if address checks are delegated to a forwarding proxy.
    #[must_use]
    pub const fn is_proxied(&self) -> bool {
        self.transport.is_proxied()
    }
}
