//! Policy error types.

use thiserror::Error;

/// Policy-related errors.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy document violates a structural invariant.
    #[error("Invalid policy: {message}")]
    InvalidPolicy { message: String },
}

impl PolicyError {
    /// Create an invalid policy error.
    pub fn invalid_policy(message: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            message: message.into(),
        }
    }
}

/// Result type alias for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
