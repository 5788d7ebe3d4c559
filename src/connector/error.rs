//! Connector error types

use super::messages::ControlMessageError;
use crate::core::error_handling::ContextualError;
use crate::definition::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("{message}")]
    Synchronisation { message: String },

    #[error("Definition store error: {0}")]
    Store(#[from] StoreError),

    #[error("Control message error: {0}")]
    ControlMessage(#[from] ControlMessageError),

    #[error("Session '{name}' is already registered")]
    DuplicateSession { name: String },

    #[error("Session '{name}' is not registered")]
    UnknownSession { name: String },

    #[error("Connector has been shut down")]
    ShutDown,

    #[error("Connector must be created inside a tokio runtime")]
    NoRuntime,
}

impl ContextualError for ConnectorError {
    fn is_user_actionable(&self) -> bool {
        match self {
            ConnectorError::Store(error) => error.is_user_actionable(),
            ConnectorError::DuplicateSession { .. } | ConnectorError::UnknownSession { .. } => true,
            _ => false,
        }
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ConnectorError::Store(error) => error.user_message(),
            ConnectorError::DuplicateSession { .. } => {
                Some("Session names must be unique across outgoing and inbound sessions")
            }
            ConnectorError::UnknownSession { .. } => {
                Some("No session is registered under that name")
            }
            _ => None,
        }
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
