//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::args::CliArgs;

pub(crate) const APP_NAME: &str = "media-proxy";
pub(crate) const APP_QUALIFIER: &str = "org";
pub(crate) const APP_ORGANIZATION: &str = "media-proxy";

/// Default ceiling for a downloaded body, in bytes.
pub const DEFAULT_MAX_SIZE: u64 = 262_144_000;

/// Default decoded pixel ceiling per image.
pub const DEFAULT_MAX_DECODED_PIXELS: u64 = 100_000_000;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Image served when a request carrying `fallback` fails.
    #[serde(default)]
    pub fallback_image: Option<PathBuf>,

    /// Directory for downloads. System temp dir when unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Outbound fetch settings.
    #[serde(default)]
    pub fetch: FetchSettings,

    /// Image transform settings.
    #[serde(default)]
    pub transform: TransformSettings,

    /// Headers added to every response.
    #[serde(default)]
    pub response: ResponseSettings,
}

/// Outbound fetch settings as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSettings {
    /// `User-Agent` sent upstream.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// CIDR ranges exempt from the private-address block.
    #[serde(default)]
    pub allowed_private_networks: Vec<String>,

    /// Largest accepted body, in bytes.
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    /// Forwarding proxy URL.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Timeout for each network stage, in seconds.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// Timeout for the whole fetch, in seconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Redirect hops followed.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            allowed_private_networks: Vec::new(),
            max_size: DEFAULT_MAX_SIZE,
            proxy: None,
            stage_timeout_secs: default_stage_timeout(),
            operation_timeout_secs: default_operation_timeout(),
            max_redirects: default_max_redirects(),
        }
    }
}

/// Image transform settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSettings {
    /// Transforms allowed to run at once.
    #[serde(default = "default_max_concurrent_transforms")]
    pub max_concurrent_transforms: usize,

    /// Largest decoded image accepted, in pixels.
    #[serde(default = "default_max_decoded_pixels")]
    pub max_decoded_pixels: u64,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            max_concurrent_transforms: default_max_concurrent_transforms(),
            max_decoded_pixels: DEFAULT_MAX_DECODED_PIXELS,
        }
    }
}

/// Headers added to every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSettings {
    /// `Access-Control-Allow-Origin`.
    #[serde(default = "default_wildcard")]
    pub allow_origin: String,

    /// `Access-Control-Allow-Headers`.
    #[serde(default = "default_wildcard")]
    pub allow_headers: String,

    /// `Content-Security-Policy`.
    #[serde(default = "default_content_security_policy")]
    pub content_security_policy: String,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        Self {
            allow_origin: default_wildcard(),
            allow_headers: default_wildcard(),
            content_security_policy: default_content_security_policy(),
        }
    }
}

fn default_wildcard() -> String {
    "*".to_string()
}

fn default_content_security_policy() -> String {
    "default-src 'none'; img-src 'self'; media-src 'self'; style-src 'unsafe-inline'".to_string()
}

/// Environment variables naming a forwarding proxy, in lookup order.
pub const PROXY_ENV_VARS: &[&str] = &["HTTP_PROXY", "http_proxy"];

/// First non-empty proxy variable returned by `lookup`.
fn proxy_from_env(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    PROXY_ENV_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .find(|value| !value.trim().is_empty())
}

fn default_user_agent() -> String {
    format!("MediaProxy/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_max_size() -> u64 {
    DEFAULT_MAX_SIZE
}

const fn default_stage_timeout() -> u64 {
    30
}

const fn default_operation_timeout() -> u64 {
    60
}

const fn default_max_redirects() -> usize {
    10
}

fn default_max_concurrent_transforms() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}

const fn default_max_decoded_pixels() -> u64 {
    DEFAULT_MAX_DECODED_PIXELS
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(proxy) = args
            .proxy
            .clone()
            .or_else(|| proxy_from_env(|name| std::env::var(name).ok()))
        {
            self.fetch.proxy = Some(proxy);
        }
        if !args.allow_network.is_empty() {
            self.fetch
                .allowed_private_networks
                .extend(args.allow_network.iter().cloned());
        }
        if let Some(max_size) = args.max_size {
            self.fetch.max_size = max_size;
        }
        if let Some(fallback) = &args.fallback_image {
            self.fallback_image = Some(fallback.clone());
        }
        if let Some(temp_dir) = &args.temp_dir {
            self.temp_dir = Some(temp_dir.clone());
        }
    }

    /// Log file to write to. `None` logs to stderr.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            fallback_image: None,
            temp_dir: None,
            fetch: FetchSettings::default(),
            transform: TransformSettings::default(),
            response: ResponseSettings::default(),
        }
    }
}
