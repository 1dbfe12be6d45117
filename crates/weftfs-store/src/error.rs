//! Error types for the coordination-store layer.

use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the coordination-store client and the typed registry
/// built on top of it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key does not exist.
    #[error("key '{0}' not found")]
    NotFound(String),

    /// A create hit an existing key.
    #[error("key '{0}' already exists")]
    AlreadyExists(String),

    /// A compare-and-set or compare-and-delete precondition failed.
    #[error("precondition failed for key '{0}'")]
    Conflict(String),

    /// The caller supplied an invalid or incomplete record.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A record could not be decoded. Surfaces as `Internal` at the
    /// public boundary; enumeration skips these instead.
    #[error("failed to decode record at '{key}': {reason}")]
    Codec {
        /// Key of the undecodable record.
        key: String,
        /// Decoder diagnostic.
        reason: String,
    },

    /// Transient transport failure; the operation may be retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The caller's deadline or cancellation fired before the operation
    /// completed.
    #[error("operation cancelled")]
    Cancelled,

    /// Invariant violation inside the store layer.
    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// True for failures a retry loop should attempt again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// True when the error means the key was simply absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Unavailable("connection reset".into()).is_retryable());
        assert!(!StoreError::NotFound("k".into()).is_retryable());
        assert!(!StoreError::Conflict("k".into()).is_retryable());
        assert!(!StoreError::Cancelled.is_retryable());
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(StoreError::NotFound("k".into()).is_not_found());
        assert!(!StoreError::AlreadyExists("k".into()).is_not_found());
    }
}
