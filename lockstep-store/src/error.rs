//! Error types for the state store.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value has the wrong type for its key.
    #[error("type mismatch for {key}: expected {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The backing store refused the write.
    #[error("write rejected: {0}")]
    WriteRejected(String),
}

impl From<lockstep_types::Error> for StorageError {
    fn from(e: lockstep_types::Error) -> Self {
        Self::InvalidData(e.to_string())
    }
}
