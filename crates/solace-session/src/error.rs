use solace_core::errors::{ErrorKind, GatewayError};

#[derive(Clone, Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("sending disabled: {0}")]
    Configuration(String),

    #[error("turn cancelled")]
    Cancelled,

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Gateway(e) => e.kind(),
        }
    }

    /// Text safe to show the person using the app. Diagnostics stay in the log.
    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}
