//! Contextual error reporting
//!
//! Connector errors fall into two groups: those an operator can fix
//! (a missing definition, a bad configuration value) and system failures
//! (a transport error, a poisoned lock). Both are reported through one
//! function so fatal lines look the same wherever they come from.

/// Errors that know whether an operator can act on them
///
/// When `is_user_actionable()` returns `true`, `user_message()` should return
/// `Some(message)`; otherwise it should return `None`.
pub trait ContextualError: std::error::Error {
    fn is_user_actionable(&self) -> bool;

    fn user_message(&self) -> Option<&str>;
}

/// Log an error as fatal, preferring the operator-facing message when there is one
///
/// Full details go to debug level only.
///
/// # Examples
/// ```rust,no_run
/// # use amqp_connector::core::error_handling::log_error_with_context;
/// # use amqp_connector::definition::{DefinitionId, StoreError};
/// let error = StoreError::NotFound { cluster_id: 1, definition_id: DefinitionId(7) };
/// log_error_with_context(&error, "Loading connection definition");
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => {
            log::error!("FATAL: {}: {}", operation_context, user_msg)
        }
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct OperatorError {
        message: String,
    }

    impl fmt::Display for OperatorError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl std::error::Error for OperatorError {}

    impl ContextualError for OperatorError {
        fn is_user_actionable(&self) -> bool {
            true
        }

        fn user_message(&self) -> Option<&str> {
            Some(&self.message)
        }
    }

    #[derive(Debug)]
    struct SystemError;

    impl fmt::Display for SystemError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection reset by peer")
        }
    }

    impl std::error::Error for SystemError {}

    impl ContextualError for SystemError {
        fn is_user_actionable(&self) -> bool {
            false
        }

        fn user_message(&self) -> Option<&str> {
            None
        }
    }

    #[test]
    fn test_operator_error_exposes_message() {
        let error = OperatorError {
            message: "Definition 7 does not exist in cluster 1".to_string(),
        };
        assert!(error.is_user_actionable());
        assert_eq!(
            error.user_message(),
            Some("Definition 7 does not exist in cluster 1")
        );
        log_error_with_context(&error, "Loading definition");
    }

    #[test]
    fn test_system_error_has_no_user_message() {
        let error = SystemError;
        assert!(!error.is_user_actionable());
        assert_eq!(error.user_message(), None);
        log_error_with_context(&error, "Opening channel");
    }
}
