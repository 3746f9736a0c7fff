//! Error types for brainstore.

use thiserror::Error;

/// Result type alias using brainstore's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for brainstore operations.
///
/// Remote failures carry a `transient` flag: transient errors (lock
/// contention, pool timeouts, rate limits, 5xx responses) may succeed when an
/// idempotent operation is retried; everything else is final.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Brain not found
    #[error("Brain not found: {0}")]
    BrainNotFound(uuid::Uuid),

    /// Caller is not allowed to perform the operation on the brain
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Relational or vector store call failed
    #[error("Store error: {message}")]
    Store { message: String, transient: bool },

    /// Embedding generation failed
    #[error("Embedding error: {message}")]
    Embedding { message: String, transient: bool },

    /// A stored row could not be decoded into its typed record
    #[error("Decode error: {0}")]
    Decode(String),

    /// Text could not be extracted from an uploaded file
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn store(message: impl Into<String>) -> Self {
        Error::Store {
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient_store(message: impl Into<String>) -> Self {
        Error::Store {
            message: message.into(),
            transient: true,
        }
    }

    pub fn embedding(message: impl Into<String>, transient: bool) -> Self {
        Error::Embedding {
            message: message.into(),
            transient,
        }
    }

    /// Whether retrying the failed (idempotent) operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Store { transient, .. } | Error::Embedding { transient, .. } => *transient,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("report.pdf".to_string());
        assert_eq!(err.to_string(), "Not found: report.pdf");
    }

    #[test]
    fn test_error_display_brain_not_found() {
        let id = Uuid::nil();
        let err = Error::BrainNotFound(id);
        assert_eq!(err.to_string(), format!("Brain not found: {}", id));
    }

    #[test]
    fn test_store_error_transience() {
        assert!(Error::transient_store("database is locked").is_transient());
        assert!(!Error::store("no such table: vectors").is_transient());
        assert_eq!(
            Error::store("no such table: vectors").to_string(),
            "Store error: no such table: vectors"
        );
    }

    #[test]
    fn test_embedding_error_transience() {
        assert!(Error::embedding("429 Too Many Requests", true).is_transient());
        assert!(!Error::embedding("401 Unauthorized", false).is_transient());
    }

    #[test]
    fn test_non_remote_errors_are_final() {
        assert!(!Error::Forbidden("not an owner".into()).is_transient());
        assert!(!Error::Decode("bad uuid".into()).is_transient());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Decode(_)));
    }
}
