use thiserror::Error;

use crate::message::MessageId;

/// Errors from repository operations (used by trait definitions in volpina-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by message operations.
///
/// `Validation` and `NotFound` are client errors. `Store` and
/// `PruneAfterAppend` are server errors whose details stay in the logs.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("message {0} not found")]
    NotFound(MessageId),

    #[error("store error during {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: RepositoryError,
    },

    /// The append committed but the prune step did not. The caller must treat
    /// the request as possibly applied.
    #[error("message {id} was stored but pruning failed: {source}")]
    PruneAfterAppend {
        id: MessageId,
        #[source]
        source: RepositoryError,
    },
}

impl MessageError {
    /// Wrap a store failure with the name of the operation that hit it.
    pub fn store(operation: &'static str, source: RepositoryError) -> Self {
        MessageError::Store { operation, source }
    }

    /// True for errors caused by the request rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, MessageError::Validation(_) | MessageError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_message_error_display() {
        let err = MessageError::NotFound(MessageId(42));
        assert_eq!(err.to_string(), "message 42 not found");

        let err = MessageError::store("append", RepositoryError::Connection);
        assert_eq!(
            err.to_string(),
            "store error during append: database connection error"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(MessageError::Validation("x".to_string()).is_client_error());
        assert!(MessageError::NotFound(MessageId(1)).is_client_error());
        assert!(!MessageError::store("list", RepositoryError::Connection).is_client_error());
        assert!(
            !MessageError::PruneAfterAppend {
                id: MessageId(7),
                source: RepositoryError::Query("locked".to_string()),
            }
            .is_client_error()
        );
    }
}
