//! Compute API client errors

use thiserror::Error;

/// Errors that can occur when interacting with the Compute Engine API
#[derive(Debug, Error)]
pub enum GcpError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Compute API returned an error
    #[error("Compute API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (missing, invalid or expired token)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists (a concurrent or earlier insert won)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Long-running operation finished with an error
    #[error("Operation {operation} failed: {message}")]
    Operation { operation: String, message: String },
}

impl GcpError {
    /// Whether the error means the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GcpError::NotFound(_))
    }

    /// Whether the error means the resource being inserted already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, GcpError::AlreadyExists(_))
    }
}
