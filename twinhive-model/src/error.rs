//! The user-visible error taxonomy.
//!
//! Every denial or invalid-input error carries a stable machine-readable
//! code plus a remediation hint. Infrastructure failures are wrapped into
//! [`DomainError::Internal`]; their cause is kept for server-side logs but
//! never rendered into the user-facing message.

use thiserror::Error;

use crate::entity::{EntityId, PolicyId};

/// Errors surfaced to the caller of an enforcement decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    /// The entity does not exist or the caller has no READ permission.
    #[error("The twin '{entity_id}' could not be found or the requester is missing READ permission on it.")]
    NotAccessible { entity_id: EntityId },

    /// The caller has no WRITE permission on the addressed resource.
    #[error("The twin '{entity_id}' could not be modified as the requester is missing WRITE permission on the addressed resource.")]
    NotModifiable { entity_id: EntityId },

    /// The entity exists but its attached policy has been deleted.
    #[error("The twin '{entity_id}' could not be accessed as its policy '{policy_id}' is not or no longer existing.")]
    PolicyDeleted {
        entity_id: EntityId,
        policy_id: PolicyId,
    },

    /// The caller may not read a field referenced by the condition.
    #[error("The condition was not fulfilled due to insufficient READ permission on a referenced field.")]
    ConditionFailed,

    /// The caller may not read a field referenced by the live-channel
    /// condition.
    #[error("The live channel condition was not fulfilled due to insufficient READ permission on a referenced field.")]
    LiveChannelConditionFailed,

    /// The condition expression could not be parsed or references an
    /// invalid field.
    #[error("The condition '{condition}' is invalid: {reason}")]
    ConditionInvalid { condition: String, reason: String },

    /// A live-channel condition was supplied on a command type that never
    /// supports the live channel.
    #[error("A live channel condition is only allowed on retrieve commands.")]
    LiveChannelConditionNotAllowed,

    /// Public twin descriptions are disabled on this installation.
    #[error("Retrieving public twin descriptions is disabled on this installation.")]
    DescriptionsDisabled,

    /// Infrastructure failure wrapped for the caller; the cause stays
    /// server-side.
    #[error("An unexpected internal error occurred.")]
    Internal { cause: String },
}

impl DomainError {
    pub fn not_accessible(entity_id: EntityId) -> Self {
        Self::NotAccessible { entity_id }
    }

    pub fn not_modifiable(entity_id: EntityId) -> Self {
        Self::NotModifiable { entity_id }
    }

    pub fn policy_deleted(entity_id: EntityId, policy_id: PolicyId) -> Self {
        Self::PolicyDeleted {
            entity_id,
            policy_id,
        }
    }

    pub fn condition_invalid(condition: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConditionInvalid {
            condition: condition.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(cause: impl Into<String>) -> Self {
        Self::Internal {
            cause: cause.into(),
        }
    }

    /// The stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotAccessible { .. } => "twin:notaccessible",
            DomainError::NotModifiable { .. } => "twin:notmodifiable",
            DomainError::PolicyDeleted { .. } => "twin:policy.deleted",
            DomainError::ConditionFailed => "twin:condition.failed",
            DomainError::LiveChannelConditionFailed => "twin:livechannelcondition.failed",
            DomainError::ConditionInvalid { .. } => "twin:condition.invalid",
            DomainError::LiveChannelConditionNotAllowed => "twin:livechannelcondition.notallowed",
            DomainError::DescriptionsDisabled => "twin:descriptions.disabled",
            DomainError::Internal { .. } => "internal.error",
        }
    }

    /// A human-readable remediation hint for the caller.
    pub fn description(&self) -> String {
        match self {
            DomainError::NotAccessible { .. } => {
                "Check if the ID of your requested twin was correct and you have sufficient permissions.".to_string()
            }
            DomainError::NotModifiable { .. } => {
                "Check if the ID of your requested twin was correct and you have sufficient permissions.".to_string()
            }
            DomainError::PolicyDeleted { policy_id, .. } => format!(
                "Recreate the policy '{}' in order to get access to the twin again.",
                policy_id
            ),
            DomainError::ConditionFailed | DomainError::LiveChannelConditionFailed => {
                "Ensure you have READ permission on every field referenced by the condition.".to_string()
            }
            DomainError::ConditionInvalid { .. } => {
                "Check the syntax of the condition and that every referenced field forms a valid pointer.".to_string()
            }
            DomainError::LiveChannelConditionNotAllowed => {
                "Remove the live channel condition header or use a retrieve command.".to_string()
            }
            DomainError::DescriptionsDisabled => {
                "Ask the operator of this installation to enable the description integration.".to_string()
            }
            DomainError::Internal { .. } => {
                "Retry the request later; if the problem persists, contact the service operator.".to_string()
            }
        }
    }

    /// Whether this error was caused by the system rather than the caller.
    pub fn is_internal(&self) -> bool {
        matches!(self, DomainError::Internal { .. })
    }
}
