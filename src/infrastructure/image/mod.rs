//! Image decoding, resizing and encoding.

pub mod badge;
pub mod codec;
pub mod geometry;
pub mod svg_raster;
pub mod transform;

pub use geometry::Bounds;
pub use transform::{TransformDispatcher, open_stream};
