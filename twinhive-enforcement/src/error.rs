//! Error types for the enforcement crate.
//!
//! [`DomainError`]s are the decisions themselves (denials, invalid input,
//! wrapped internal errors); [`EnforcementError`] adds the transport-level
//! outcomes of talking to an enforcement unit.

use thiserror::Error;

use twinhive_model::DomainError;

/// Errors returned to callers of the enforcement surface.
#[derive(Debug, Error)]
pub enum EnforcementError {
    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The decision engine denied or failed the request.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The signal is not governed by this enforcement domain.
    #[error("signal is not applicable to twin enforcement")]
    NotApplicable,

    /// The enforcement unit stopped before answering.
    #[error("enforcement unit terminated before answering")]
    UnitTerminated,

    /// The response could not be filtered and was dropped rather than
    /// forwarded unfiltered.
    #[error("response was dropped because it could not be filtered")]
    ResponseDropped,
}

impl EnforcementError {
    /// The domain error carried by this error, if any.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            EnforcementError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for enforcement operations.
pub type Result<T> = std::result::Result<T, EnforcementError>;
