//! Policy compilation and permission evaluation for twinhive.
//!
//! This crate turns a [`Policy`] document into an immutable
//! [`CompiledEnforcer`] and answers permission questions against it:
//!
//! - **Unrestricted** checks: the permission is effective at the resource
//!   and nothing below it revokes the permission again
//! - **Partial** checks: the permission is effective somewhere within the
//!   resource's subtree
//! - **Subject expansion**: all subjects holding unrestricted permission at
//!   a resource, independent of any caller
//! - **View building**: a redacted copy of a JSON document retaining only
//!   caller-visible nodes
//!
//! # Evaluation Semantics
//!
//! Grants and revokes are attached to resource keys, which form a tree by
//! pointer-prefix relation. Resolution rules:
//!
//! 1. A grant or revoke at a node applies to the node and everything below
//!    it until a deeper declaration overrides it
//! 2. Deeper declarations always win over shallower ones
//! 3. At the same node, an explicit revoke beats an explicit grant
//! 4. A revoke anywhere below a node makes permission at that node
//!    *partial*, never *unrestricted*
//!
//! # Usage
//!
//! Build a [`PolicyEnforcer`] from a policy document; it bundles the policy
//! snapshot with its compiled form and is cheap to clone (`Arc`-backed).
//! The bundle is the unit of caching and invalidation: a policy change
//! always yields a brand-new bundle, never an in-place update.

mod error;
mod evaluate;
mod index;
mod types;
mod view;

pub use error::{PolicyError, Result};
pub use index::compile_policy;
pub use types::{CompiledEnforcer, Policy, PolicyEntry, PolicyEnforcer, ResourceGrant};
pub use view::FieldSelector;
