//! Command-line interface.

use super::app_config::LogLevel;
use crate::domain::ProxyFlags;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "media-proxy",
    version,
    about = "Fetch remote media safely and convert it for display",
    long_about = None
)]
pub struct CliArgs {
    /// Remote URL, or a proxy request path such as `/proxy/a.png?url=...&static=1`.
    #[arg(value_name = "URL|REQUEST")]
    pub target: String,

    /// Emoji rendition (height 128).
    #[arg(long)]
    pub emoji: bool,

    /// Avatar rendition (height 320).
    #[arg(long)]
    pub avatar: bool,

    /// First frame only.
    #[arg(long = "static")]
    pub still: bool,

    /// Small preview.
    #[arg(long)]
    pub preview: bool,

    /// Monochrome notification badge.
    #[arg(long)]
    pub badge: bool,

    /// Serve the fallback image on failure.
    #[arg(long)]
    pub fallback: bool,

    /// Write the body here instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Forwarding proxy for outbound requests. `http_proxy` is read when
    /// `HTTP_PROXY` is unset.
    #[arg(long, env = "HTTP_PROXY", value_name = "URL")]
    pub proxy: Option<String>,

    /// Private network to allow, in CIDR form. Repeatable.
    #[arg(long, value_name = "CIDR")]
    pub allow_network: Vec<String>,

    /// Largest accepted body, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_size: Option<u64>,

    /// Image served on failure when `--fallback` is set.
    #[arg(long, value_name = "PATH")]
    pub fallback_image: Option<PathBuf>,

    /// Directory for downloads.
    #[arg(long, value_name = "PATH")]
    pub temp_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Flags given as command-line switches.
    #[must_use]
    pub fn flags(&self) -> ProxyFlags {
        let mut flags = ProxyFlags::empty();
        flags.set(ProxyFlags::EMOJI, self.emoji);
        flags.set(ProxyFlags::AVATAR, self.avatar);
        flags.set(ProxyFlags::STATIC, self.still);
        flags.set(ProxyFlags::PREVIEW, self.preview);
        flags.set(ProxyFlags::BADGE, self.badge);
        flags.set(ProxyFlags::FALLBACK, self.fallback);
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_from_switches() {
        let args = CliArgs::parse_from(["media-proxy", "https://a.example/x.gif", "--static", "--badge"]);
        assert_eq!(args.flags(), ProxyFlags::STATIC | ProxyFlags::BADGE);
        assert_eq!(args.target, "https://a.example/x.gif");
    }
}
