//! Asynchronous policy lookup seams.
//!
//! The enforcement layer never talks to persistence directly; it resolves
//! the policy id bound to an entity and the compiled enforcer for that
//! policy through these traits. Implementations choose the most efficient
//! strategy (shard lookup, cache, remote call).

use async_trait::async_trait;
use thiserror::Error;

use twinhive_model::{EntityId, PolicyId};
use twinhive_policy::PolicyEnforcer;

/// Errors raised by resolver implementations.
///
/// These are infrastructure failures, not denials: a resolver that knows
/// the entity has no policy returns `Ok(None)` from
/// [`PolicyEnforcerResolver::policy_enforcer_for`] instead of an error.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The entity/policy link could not be determined.
    #[error("policy id could not be resolved: {message}")]
    PolicyIdUnresolved { message: String },

    /// The lookup failed for reasons other than "not found".
    #[error("policy lookup failed: {message}")]
    Infrastructure { message: String },
}

impl ResolveError {
    pub fn policy_id_unresolved(message: impl Into<String>) -> Self {
        Self::PolicyIdUnresolved {
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
        }
    }
}

/// Resolves the policy id governing an entity.
#[async_trait]
pub trait PolicyIdResolver: Send + Sync {
    async fn policy_id_for(&self, entity_id: &EntityId) -> Result<PolicyId, ResolveError>;
}

/// Resolves the compiled policy enforcer for a policy id.
#[async_trait]
pub trait PolicyEnforcerResolver: Send + Sync {
    /// `Ok(None)` means the policy does not exist (no policy attached, or
    /// deleted after having been attached); `Err` means the lookup itself
    /// failed.
    async fn policy_enforcer_for(
        &self,
        policy_id: &PolicyId,
    ) -> Result<Option<PolicyEnforcer>, ResolveError>;
}
