//! Presentation layer: inbound request parsing and response mapping.

/// Request path and query parsing.
pub mod request;
/// Response status, headers and body.
pub mod response;

pub use request::ProxyRequest;
pub use response::{Body, Placeholder, ProxyResponse, Responder};
