use thiserror::Error;

/// Errors returned by context store backends.
#[derive(Debug, Error)]
pub enum ContextStoreError {
    /// No entry exists for the session; callers treat this as a fresh start.
    #[error("context not found")]
    NotFound,

    #[error("context store unavailable: {0}")]
    Unavailable(String),

    #[error("context serialization error: {0}")]
    Serialization(String),

    #[error("keygroup bootstrap failed: {0}")]
    Bootstrap(String),
}

impl ContextStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContextStoreError::NotFound)
    }
}

impl From<serde_json::Error> for ContextStoreError {
    fn from(e: serde_json::Error) -> Self {
        ContextStoreError::Serialization(e.to_string())
    }
}

/// Errors returned by the session history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("session '{0}' has expired")]
    SessionExpired(String),

    #[error("query error: {0}")]
    Query(String),
}

/// Errors returned by the inference capability.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference provider error: {message}")]
    Provider { message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("invalid inference request: {0}")]
    InvalidRequest(String),
}

/// Caller-visible failures of the completion pipeline.
///
/// Every variant is raised before any persistent mutation happens.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("turn conflict: expected {expected}, received {received}")]
    Conflict { expected: u64, received: u64 },

    #[error("upstream error: {0}")]
    Upstream(#[from] InferenceError),

    #[error("context store error: {0}")]
    Storage(#[from] ContextStoreError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        assert!(ContextStoreError::NotFound.is_not_found());
        assert!(!ContextStoreError::Unavailable("down".into()).is_not_found());
    }

    #[test]
    fn conflict_message_names_both_turns() {
        let err = CompletionError::Conflict {
            expected: 2,
            received: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 2"));
        assert!(msg.contains("received 5"));
    }

    #[test]
    fn serde_errors_become_serialization_errors() {
        let e = serde_json::from_str::<u64>("nope").unwrap_err();
        let err: ContextStoreError = e.into();
        assert!(matches!(err, ContextStoreError::Serialization(_)));
    }
}
