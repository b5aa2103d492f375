//! Outcome of a completed fetch.

use std::path::PathBuf;

/// Bytes of a remote resource landed on disk.
///
/// The file at `path` belongs to the temp resource that was handed to the
/// fetcher; this value only describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Location of the downloaded bytes.
    pub path: PathBuf,
    /// Filename from the URL path or `Content-Disposition`.
    pub filename: String,
    /// Number of bytes written. Never exceeds the configured maximum.
    pub byte_count: u64,
}
