//! Permission evaluation over the compiled trie.
//!
//! All queries are pure functions of (enforcer, resource key,
//! authorization context, permission). Resolution rules:
//!
//! - the deepest grant/revoke on the root-to-key path decides the
//!   *effective* permission at the key; a revoke beats a grant declared at
//!   the same node
//! - *unrestricted* additionally requires that no node below the key
//!   revokes the permission again
//! - *partial* is satisfied by an effective grant at the key or anywhere
//!   within its subtree

use std::collections::HashSet;

use twinhive_model::{AuthSubject, AuthorizationContext, Permission, ResourceKey};

use crate::types::{AclNode, CompiledEnforcer};

impl CompiledEnforcer {
    /// Whether some subject of `ctx` holds `permission` on `key` and on
    /// everything below it.
    pub fn has_unrestricted_permission(
        &self,
        key: &ResourceKey,
        ctx: &AuthorizationContext,
        permission: Permission,
    ) -> bool {
        ctx.iter()
            .any(|subject| self.unrestricted_for_subject(key, subject, permission))
    }

    /// Whether every key of the set passes
    /// [`has_unrestricted_permission`](Self::has_unrestricted_permission).
    ///
    /// An empty key set passes trivially.
    pub fn has_unrestricted_permissions<'a, I>(
        &self,
        keys: I,
        ctx: &AuthorizationContext,
        permission: Permission,
    ) -> bool
    where
        I: IntoIterator<Item = &'a ResourceKey>,
    {
        keys.into_iter()
            .all(|key| self.has_unrestricted_permission(key, ctx, permission))
    }

    /// Whether some subject of `ctx` holds `permission` on `key` or on any
    /// descendant of `key`.
    pub fn has_partial_permission(
        &self,
        key: &ResourceKey,
        ctx: &AuthorizationContext,
        permission: Permission,
    ) -> bool {
        ctx.iter()
            .any(|subject| self.partial_for_subject(key, subject, permission))
    }

    /// All subjects that would pass the unrestricted check at `key`,
    /// independent of any caller.
    pub fn subjects_with_unrestricted_permission(
        &self,
        key: &ResourceKey,
        permission: Permission,
    ) -> HashSet<AuthSubject> {
        let Some(root) = self.roots.get(&key.resource_type) else {
            return HashSet::new();
        };

        // Candidates are subjects mentioned anywhere on the root-to-key
        // path; a grant below the key can never be unrestricted at the key.
        let mut candidates: HashSet<&AuthSubject> = HashSet::new();
        let mut node = Some(root);
        collect_subjects(root, &mut candidates);
        for segment in key.path.segments() {
            node = node.and_then(|n| n.children.get(segment));
            match node {
                Some(n) => collect_subjects(n, &mut candidates),
                None => break,
            }
        }

        candidates
            .into_iter()
            .filter(|subject| self.unrestricted_for_subject(key, subject, permission))
            .cloned()
            .collect()
    }

    fn unrestricted_for_subject(
        &self,
        key: &ResourceKey,
        subject: &AuthSubject,
        permission: Permission,
    ) -> bool {
        if !self.effective_grant(key, subject, permission) {
            return false;
        }
        match self.node_at(key) {
            Some(node) => !subtree_revokes(node, subject, permission),
            // no nodes below the key exist, so nothing can revoke
            None => true,
        }
    }

    fn partial_for_subject(
        &self,
        key: &ResourceKey,
        subject: &AuthSubject,
        permission: Permission,
    ) -> bool {
        if self.effective_grant(key, subject, permission) {
            return true;
        }
        match self.node_at(key) {
            Some(node) => subtree_grants(node, subject, permission, false),
            None => false,
        }
    }

    /// The effective permission at the key: deepest declaration on the
    /// root-to-key path wins, revoke beating grant at the same node.
    pub(crate) fn effective_grant(
        &self,
        key: &ResourceKey,
        subject: &AuthSubject,
        permission: Permission,
    ) -> bool {
        let Some(root) = self.roots.get(&key.resource_type) else {
            return false;
        };
        let mut granted = apply_node(root, subject, permission, false);
        let mut node = root;
        for segment in key.path.segments() {
            match node.children.get(segment) {
                Some(child) => {
                    node = child;
                    granted = apply_node(child, subject, permission, granted);
                }
                // the remaining path has no declarations; it inherits
                None => break,
            }
        }
        granted
    }

    /// The trie node exactly at the key, if any declarations reach it.
    fn node_at(&self, key: &ResourceKey) -> Option<&AclNode> {
        let mut node = self.roots.get(&key.resource_type)?;
        for segment in key.path.segments() {
            node = node.children.get(segment)?;
        }
        Some(node)
    }
}

/// Apply one node's declarations for (subject, permission) to the state
/// inherited from above.
fn apply_node(
    node: &AclNode,
    subject: &AuthSubject,
    permission: Permission,
    inherited: bool,
) -> bool {
    match node.acl.get(subject) {
        Some(entry) if entry.revoked.grants(permission) => false,
        Some(entry) if entry.granted.grants(permission) => true,
        _ => inherited,
    }
}

/// Whether any node strictly below `node` revokes (subject, permission).
fn subtree_revokes(node: &AclNode, subject: &AuthSubject, permission: Permission) -> bool {
    node.children.values().any(|child| {
        child
            .acl
            .get(subject)
            .is_some_and(|entry| entry.revoked.grants(permission))
            || subtree_revokes(child, subject, permission)
    })
}

/// Whether the effective permission becomes granted anywhere strictly
/// below `node`, starting from the given inherited state.
fn subtree_grants(
    node: &AclNode,
    subject: &AuthSubject,
    permission: Permission,
    inherited: bool,
) -> bool {
    node.children.values().any(|child| {
        let state = apply_node(child, subject, permission, inherited);
        state || subtree_grants(child, subject, permission, state)
    })
}

fn collect_subjects<'a>(node: &'a AclNode, into: &mut HashSet<&'a AuthSubject>) {
    into.extend(node.acl.keys());
}
