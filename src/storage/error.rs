//! Storage error types
//!
//! Defines all errors that can occur in the storage layer, whichever backend
//! is in use.

use thiserror::Error;

/// Errors that can occur in a journal store
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite reported an error
    #[error("Database error: {0}")]
    Database(String),

    /// Requested post or comment does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend does not offer this operation
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },

    /// Remote backend could not be reached
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Remote backend did not answer in time
    #[error("Backend request timed out")]
    Timeout,

    /// Remote backend answered with a non-success status
    #[error("Backend error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl StorageError {
    /// Whether the error means the addressed row does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Timeout
        } else if err.is_connect() {
            StorageError::Unavailable(err.to_string())
        } else if err.is_decode() {
            StorageError::Serialization(err.to_string())
        } else {
            StorageError::Unavailable(err.to_string())
        }
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
