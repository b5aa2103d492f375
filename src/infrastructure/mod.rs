//! Infrastructure layer: network, filesystem and codec adapters.

/// Application configuration.
pub mod config;
/// Outbound HTTP with address policy enforcement.
pub mod http;
/// Image transforms.
pub mod image;
/// Content sniffing.
pub mod sniff;
/// Temporary file lifecycle.
pub mod temp;

pub use config::{
    AppConfig, CliArgs, FetchSettings, LogLevel, ResponseSettings, StorageManager, TransformSettings,
};
pub use http::{FetchConfig, SecureFetcher};
pub use image::TransformDispatcher;
pub use sniff::TypeSniffer;
pub use temp::{ReleaseHandle, TempAllocator, TempResource};
