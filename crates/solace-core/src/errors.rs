use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Failures a provider gateway can report.
///
/// `Unknown` carries the provider's raw text for diagnostics only. Nothing
/// downstream branches on its contents.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("provider not configured: {0}")]
    Configuration(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("provider error: {diagnostic}")]
    Unknown {
        status: Option<u16>,
        diagnostic: String,
    },
}

impl GatewayError {
    pub fn unknown(diagnostic: impl Into<String>) -> Self {
        Self::Unknown {
            status: None,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::NetworkUnavailable(_) => ErrorKind::NetworkUnavailable,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Failures worth an automatic retry before any output has been seen.
    /// Rate limits and credential problems are left to the user.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkUnavailable(_) => true,
            Self::Unknown { status: Some(s), .. } => (500..=599).contains(s),
            _ => false,
        }
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        if let Self::RateLimited { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(body),
            429 => Self::RateLimited { retry_after: None },
            _ => Self::Unknown {
                status: Some(status),
                diagnostic: body,
            },
        }
    }
}

/// Error classification shared by the gateway, the session manager and the
/// presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    InvalidInput,
    NetworkUnavailable,
    Unauthorized,
    RateLimited,
    Unknown,
    Cancelled,
}

impl ErrorKind {
    /// Short classification string for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::InvalidInput => "invalid_input",
            Self::NetworkUnavailable => "network_unavailable",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::Unknown => "unknown",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the user can reasonably try the same message again.
    pub fn is_user_retriable(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable | Self::Unauthorized | Self::RateLimited | Self::Unknown
        )
    }

    /// Non-technical text shown next to the input box.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Configuration => {
                "The assistant isn't configured yet. Add an API key and restart to start chatting."
            }
            Self::InvalidInput => "Please type a message and wait for the current reply to finish.",
            Self::NetworkUnavailable => "You're offline. Please check your internet connection.",
            Self::Unauthorized => "Auth error. Check your API key.",
            Self::RateLimited => "Rate limited. Please wait and try again.",
            Self::Unknown => {
                "I'm experiencing some technical difficulties. Please try again in a moment. \
                 If you're in crisis, please reach out to a mental health professional or \
                 crisis helpline immediately."
            }
            Self::Cancelled => "The conversation was cleared before a reply arrived.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
