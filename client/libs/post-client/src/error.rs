//! Error types for post repository calls

use thiserror::Error;

/// Result type alias for repository calls
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Failures reported by a [`crate::PostRepository`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Transport failure, timeout or connection refused
    #[error("Network error: {0}")]
    Network(String),

    /// Token missing, expired or not allowed to perform the call
    #[error("Authorization failed: {0}")]
    Auth(String),

    /// Target post, like or comment does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Response body did not match the expected JSON shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Any other non-success status
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl RepositoryError {
    /// Map a non-success HTTP status to the error taxonomy
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Auth(message),
            404 => Self::NotFound(message),
            _ => Self::Server { status, message },
        }
    }

    /// Check if a repeated attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for RepositoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RepositoryError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RepositoryError::from_status(status.as_u16(), err.to_string())
        } else {
            RepositoryError::Network(err.to_string())
        }
    }
}
