//! Error types for the user directory.

use thiserror::Error;
use weftfs_store::StoreError;

/// Result alias for user-directory operations.
pub type Result<T> = std::result::Result<T, UserError>;

/// Errors surfaced by the user directory.
#[derive(Debug, Error)]
pub enum UserError {
    /// No user matched the reference.
    #[error("user '{0}' not found")]
    NotFound(String),

    /// A unique field (name or email) is already taken.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The caller supplied an invalid reference or selector.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Neither the API key nor the password matched.
    #[error("username or credential doesn't match")]
    InvalidCredentials,

    /// Key derivation failed. Parameters are compile-time constants, so
    /// this indicates a programming error, not bad input.
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// A stored user record could not be decoded.
    #[error("failed to decode user record at '{key}': {reason}")]
    Codec {
        /// Key of the undecodable record.
        key: String,
        /// Decoder diagnostic.
        reason: String,
    },

    /// Underlying coordination-store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
