//! Error types for the backend client.
//!
//! Only construction can fail with an error. Call results are reported
//! through [`crate::Outcome`].

use thiserror::Error;

/// Result type for client construction.
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    /// The configured base URL is unusable.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}
