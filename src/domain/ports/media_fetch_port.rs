//! Port definition for fetching remote media onto disk.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::entities::FetchResult;
use crate::domain::errors::ProxyError;

/// Streams a remote resource into a file the caller owns.
///
/// Implementations must write incrementally and must never leave more than
/// the configured maximum number of bytes in `dest`.
#[async_trait]
pub trait MediaFetchPort: Send + Sync {
    /// Per-call policy (limits, allow-lists, transport).
    type Config: Send + Sync;

    /// Downloads `url` into `dest`.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        config: &Self::Config,
    ) -> Result<FetchResult, ProxyError>;
}
