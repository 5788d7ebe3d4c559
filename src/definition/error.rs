//! Definition store errors

use super::types::DefinitionId;
use crate::core::error_handling::ContextualError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Definition {definition_id} not found in cluster {cluster_id}")]
    NotFound {
        cluster_id: i64,
        definition_id: DefinitionId,
    },

    #[error("Definition store unavailable: {message}")]
    Unavailable { message: String },
}

impl ContextualError for StoreError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            StoreError::NotFound { .. } => {
                Some("The configured definition_id does not exist in the configured cluster")
            }
            StoreError::Unavailable { .. } => None,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
