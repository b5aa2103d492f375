//! Domain error types.

mod proxy_error;
mod status_error;

pub use proxy_error::ProxyError;
pub use status_error::StatusError;
