//! Internal failure taxonomy of the fetch/sniff/transform pipeline.

use std::net::IpAddr;

use thiserror::Error;

use super::StatusError;

/// Pipeline failure variants.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ProxyError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("blocked address: {address}")]
    ForgeryBlocked { address: IpAddr },

    #[error("max size exceeded ({size} > {max})")]
    SizeExceeded { size: u64, max: u64 },

    #[error("timed out during {stage}")]
    Timeout { stage: &'static str },

    #[error("{status} {reason}")]
    UpstreamHttp { status: u16, reason: String },

    #[error("unsupported type: {message}")]
    UnsupportedType { message: String },

    #[error("rejected type: {mime}")]
    RejectedType { mime: String },

    #[error("badge has too little entropy ({entropy:.3})")]
    DegenerateBadge { entropy: f64 },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("decode error: {message}")]
    Decode { message: String },

    #[error("encode error: {message}")]
    Encode { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Creates invalid input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates unsupported type error.
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedType {
            message: message.into(),
        }
    }

    /// Creates transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates encode error.
    #[must_use]
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// HTTP status this failure maps to.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput { .. } => 400,
            Self::UpstreamHttp { status, .. } => *status,
            Self::UnsupportedType { .. } | Self::DegenerateBadge { .. } => 404,
            Self::RejectedType { .. } => 403,
            Self::ForgeryBlocked { .. }
            | Self::SizeExceeded { .. }
            | Self::Timeout { .. }
            | Self::Transport { .. }
            | Self::Decode { .. }
            | Self::Encode { .. }
            | Self::Io(_) => 500,
        }
    }

    /// Returns true if the failure happened while talking to the upstream.
    #[must_use]
    pub const fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            Self::ForgeryBlocked { .. }
                | Self::SizeExceeded { .. }
                | Self::Timeout { .. }
                | Self::UpstreamHttp { .. }
                | Self::Transport { .. }
        )
    }
}

impl From<ProxyError> for StatusError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::InvalidInput { message } => StatusError::new(message, 400),
            ProxyError::UpstreamHttp { status, reason } => {
                StatusError::new(format!("{status} {reason}"), status).with_user_message(reason)
            }
            ProxyError::UnsupportedType { message } => StatusError::new(message, 404),
            ProxyError::DegenerateBadge { .. } => StatusError::new("Skip to provide badge", 404),
            ProxyError::RejectedType { .. } => {
                StatusError::new("Rejected type", 403).with_user_message("Rejected type")
            }
            // Nothing about addresses, sizes, paths or codecs leaves the process.
            _ => StatusError::internal(),
        }
    }
}
