//! Transport error types

use crate::core::error_handling::ContextualError;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised spuriously by the broker client while its I/O loop starts up
    #[error("Type mismatch raised during I/O loop startup: {0}")]
    StartupTypeMismatch(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ContextualError for TransportError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, TransportError::AuthenticationFailed(_))
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            TransportError::AuthenticationFailed(_) => {
                Some("The broker rejected the definition's credentials")
            }
            _ => None,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
