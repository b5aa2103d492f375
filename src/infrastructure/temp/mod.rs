//! Request-scoped temp file lifecycle.

pub mod lifecycle;

pub use lifecycle::{ReleaseHandle, TempAllocator, TempResource};
