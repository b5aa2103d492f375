//! The error shape that crosses the pipeline boundary.

use thiserror::Error;

/// An error carrying the HTTP status the front-end should answer with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StatusError {
    message: String,
    status_code: u16,
    user_message: Option<String>,
}

impl StatusError {
    /// Creates an error without a user-facing message.
    #[must_use]
    pub fn new(message: impl Into<String>, status_code: u16) -> Self {
        Self {
            message: message.into(),
            status_code,
            user_message: None,
        }
    }

    /// Attaches a message that is safe to show to the caller.
    #[must_use]
    pub fn with_user_message(mut self, user_message: impl Into<String>) -> Self {
        self.user_message = Some(user_message.into());
        self
    }

    /// Generic failure with no internal detail.
    #[must_use]
    pub fn internal() -> Self {
        Self::new("Internal error", 500)
    }

    /// Returns the log-oriented message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Returns the caller-facing message, if any.
    #[must_use]
    pub fn user_message(&self) -> Option<&str> {
        self.user_message.as_deref()
    }

    /// Returns true for 4xx codes.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status_code >= 400 && self.status_code < 500
    }

    /// Returns true for a redirect the front-end should pass through.
    #[must_use]
    pub const fn is_redirect(&self) -> bool {
        self.status_code == 302
    }
}
