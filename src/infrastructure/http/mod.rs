//! Outbound HTTP: address policy, guarded transport and the fetcher.

pub mod address_policy;
pub mod config;
pub mod content_disposition;
pub mod fetcher;
pub mod resolver;
pub mod transport;

pub use address_policy::{AddressPolicy, BlockedAddress, InvalidNetwork};
pub use config::{FetchConfig, FetchConfigError};
pub use fetcher::SecureFetcher;
pub use resolver::GuardedResolver;
pub use transport::Transport;
