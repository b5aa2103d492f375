//! Domain layer with core entities, the error taxonomy and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{FetchResult, ImagePayload, PayloadData, ProxyFlags, SniffedType, TransformKind};
pub use errors::{ProxyError, StatusError};
pub use ports::MediaFetchPort;
