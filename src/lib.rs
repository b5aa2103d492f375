//! Media Proxy - a hardened media fetching and image transformation gateway.
//!
//! This crate fetches remote media on behalf of a client, refusing any
//! connection to a non-public address, identifies the content by its
//! signature and converts images into bounded WebP or PNG renditions.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the request pipeline.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing network, filesystem and codec adapters.
pub mod infrastructure;
/// Presentation layer containing request parsing and response mapping.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "media-proxy";
