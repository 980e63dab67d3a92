//! Core policy types.
//!
//! This module defines the policy document model and the compiled,
//! queryable form:
//! - `Policy`: the persisted document (entries of subjects + resource
//!   grants/revokes)
//! - `CompiledEnforcer`: an immutable pointer trie answering permission
//!   questions
//! - `PolicyEnforcer`: the `Arc`-backed bundle of both, the unit of
//!   caching and invalidation

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use twinhive_model::{AuthSubject, Permissions, PolicyId, ResourceKey, ResourceType};

use crate::error::{PolicyError, Result};
use crate::index::compile_policy;

/// Grants and revokes for one resource key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGrant {
    /// The resource the grant/revoke targets.
    pub key: ResourceKey,
    /// Permissions granted at the resource and below.
    #[serde(default)]
    pub grant: Permissions,
    /// Permissions revoked at the resource and below.
    #[serde(default)]
    pub revoke: Permissions,
}

/// A named policy entry binding subjects to resource grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// Entry label, unique within the policy.
    pub label: String,
    /// The subjects this entry applies to.
    pub subjects: Vec<AuthSubject>,
    /// The resources this entry grants or revokes permissions on.
    pub resources: Vec<ResourceGrant>,
}

/// A policy document: the authored source a [`CompiledEnforcer`] is built
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    /// Monotonically increasing revision, bumped on every change.
    pub revision: u64,
    pub entries: Vec<PolicyEntry>,
}

impl Policy {
    /// Validate structural invariants of the document.
    pub fn validate(&self) -> Result<()> {
        let mut labels = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if entry.label.is_empty() {
                return Err(PolicyError::invalid_policy(format!(
                    "policy '{}' contains an entry with an empty label",
                    self.id
                )));
            }
            if labels.contains(&&entry.label) {
                return Err(PolicyError::invalid_policy(format!(
                    "policy '{}' contains duplicate entry label '{}'",
                    self.id, entry.label
                )));
            }
            if entry.subjects.is_empty() {
                return Err(PolicyError::invalid_policy(format!(
                    "entry '{}' of policy '{}' has no subjects",
                    entry.label, self.id
                )));
            }
            labels.push(&entry.label);
        }
        Ok(())
    }
}

/// Per-subject grant/revoke flags attached to one trie node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AclEntry {
    pub granted: Permissions,
    pub revoked: Permissions,
}

/// One node of the permission trie; children are keyed by pointer segment.
#[derive(Debug, Clone, Default)]
pub(crate) struct AclNode {
    pub children: HashMap<String, AclNode>,
    pub acl: HashMap<AuthSubject, AclEntry>,
}

/// The compiled, queryable form of a [`Policy`].
///
/// Built once by [`compile_policy`](crate::compile_policy) and never
/// mutated afterwards; safe to read concurrently from any number of
/// in-flight enforcement calls.
#[derive(Debug, Clone, Default)]
pub struct CompiledEnforcer {
    pub(crate) roots: HashMap<ResourceType, AclNode>,
}

struct PolicyEnforcerInner {
    policy: Policy,
    enforcer: CompiledEnforcer,
}

/// Bundle of a policy snapshot and its compiled enforcer.
///
/// Cheap to clone via `Arc`; the unit of caching and invalidation. A
/// policy change always yields a brand-new bundle replacing the old one.
#[derive(Clone)]
pub struct PolicyEnforcer {
    inner: Arc<PolicyEnforcerInner>,
}

impl PolicyEnforcer {
    /// Compile the policy and bundle it with the result.
    pub fn new(policy: Policy) -> Result<Self> {
        let enforcer = compile_policy(&policy)?;
        Ok(Self {
            inner: Arc::new(PolicyEnforcerInner { policy, enforcer }),
        })
    }

    pub fn policy(&self) -> &Policy {
        &self.inner.policy
    }

    pub fn enforcer(&self) -> &CompiledEnforcer {
        &self.inner.enforcer
    }

    pub fn policy_id(&self) -> &PolicyId {
        &self.inner.policy.id
    }

    pub fn revision(&self) -> u64 {
        self.inner.policy.revision
    }
}

impl std::fmt::Debug for PolicyEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEnforcer")
            .field("policy_id", self.policy_id())
            .field("revision", &self.revision())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinhive_model::Permission;

    fn policy_with_entries(entries: Vec<PolicyEntry>) -> Policy {
        Policy {
            id: PolicyId::parse("org.acme:device-policy").unwrap(),
            revision: 1,
            entries,
        }
    }

    #[test]
    fn test_validate_rejects_duplicate_labels() {
        let entry = PolicyEntry {
            label: "owner".to_string(),
            subjects: vec![AuthSubject::new("alice")],
            resources: vec![],
        };
        let policy = policy_with_entries(vec![entry.clone(), entry]);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_subjects() {
        let policy = policy_with_entries(vec![PolicyEntry {
            label: "owner".to_string(),
            subjects: vec![],
            resources: vec![],
        }]);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_policy_serde_round_trip() {
        let policy = policy_with_entries(vec![PolicyEntry {
            label: "owner".to_string(),
            subjects: vec![AuthSubject::new("alice")],
            resources: vec![ResourceGrant {
                key: ResourceKey::twin_from_str("/features").unwrap(),
                grant: Permission::Read.into(),
                revoke: Permissions::empty(),
            }],
        }]);
        let json = serde_json::to_string(&policy).unwrap();
        let back: Policy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn test_policy_enforcer_bundles_snapshot() {
        let policy = policy_with_entries(vec![PolicyEntry {
            label: "owner".to_string(),
            subjects: vec![AuthSubject::new("alice")],
            resources: vec![],
        }]);
        let bundle = PolicyEnforcer::new(policy).unwrap();
        assert_eq!(bundle.revision(), 1);
        assert_eq!(bundle.policy_id().to_string(), "org.acme:device-policy");
        // clone shares the same snapshot
        let clone = bundle.clone();
        assert!(Arc::ptr_eq(&bundle.inner, &clone.inner));
    }
}
