//! Application layer: the request pipeline and its outputs.

/// Response filenames and `Content-Disposition`.
pub mod filename;
/// Request pipeline.
pub mod pipeline;
/// Pipeline output types.
pub mod proxied_media;

pub use pipeline::PipelineCoordinator;
pub use proxied_media::{ProxiedMedia, ReleasingStream, ResponseBody};
