//! Policy compilation.
//!
//! Builds the permission trie from a policy document. Each resource key
//! creates (or extends) the node path for its pointer; grants and revokes
//! from all entries targeting the same node are merged by set union. The
//! resulting structure is immutable: a policy change recompiles from
//! scratch rather than patching in place.

use twinhive_model::{AuthSubject, Permissions};

use crate::error::Result;
use crate::types::{AclNode, CompiledEnforcer, Policy};

/// Compile a policy document into its queryable form.
///
/// Validates the document first; see [`Policy::validate`].
pub fn compile_policy(policy: &Policy) -> Result<CompiledEnforcer> {
    policy.validate()?;

    let mut enforcer = CompiledEnforcer::default();
    for entry in &policy.entries {
        for resource in &entry.resources {
            let root = enforcer
                .roots
                .entry(resource.key.resource_type)
                .or_default();
            let node = node_at_mut(root, resource.key.path.segments());
            for subject in &entry.subjects {
                merge_acl(node, subject, resource.grant, resource.revoke);
            }
        }
    }
    Ok(enforcer)
}

/// Descend to (creating as needed) the node for the given segments.
fn node_at_mut<'a>(mut node: &'a mut AclNode, segments: &[String]) -> &'a mut AclNode {
    for segment in segments {
        node = node.children.entry(segment.clone()).or_default();
    }
    node
}

fn merge_acl(node: &mut AclNode, subject: &AuthSubject, grant: Permissions, revoke: Permissions) {
    let entry = node.acl.entry(subject.clone()).or_default();
    entry.granted |= grant;
    entry.revoked |= revoke;
}
