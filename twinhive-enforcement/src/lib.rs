//! Per-entity policy enforcement for twinhive.
//!
//! This crate sits in front of a persisted twin, intercepts every command
//! and response for it, and decides, using the compiled enforcer built
//! from the twin's policy, whether the command may proceed and which
//! parts of a response may be revealed.
//!
//! # Components
//!
//! - [`ConditionEvaluator`]: extracts the resource keys a conditional-read
//!   expression references and gates them against READ permission. Parsing
//!   is delegated through the [`ConditionParser`] seam;
//!   [`RqlConditionParser`] is the shipped implementation.
//! - [`CommandAuthorizer`]: the pure decision pipeline: applicability,
//!   load-free short circuits, full/partial/merge permission resolution,
//!   condition gating, read-subject stamping, and response filtering.
//! - The enforcer actor ([`spawn_enforcer_actor`], [`EnforcerHandle`]):
//!   one single-threaded unit per entity. Resolver calls run as
//!   independently scheduled
//!   continuations, so the mailbox keeps draining while loads are in
//!   flight and completions may finish out of arrival order.
//! - [`EnforcerSupervisor`]: owns the per-entity units, recreates a unit
//!   that stopped itself after a load failure, and redelivers the
//!   triggering request once.
//!
//! # Error Handling
//!
//! Denials and invalid input surface as [`DomainError`]s to the requester.
//! Infrastructure failures on the command path answer the requester with a
//! wrapped internal error and fail-stop the unit; on the response path
//! they are logged and the response is dropped, never forwarded
//! unfiltered.
//!
//! [`DomainError`]: twinhive_model::DomainError

mod actor;
mod authorize;
mod condition;
mod config;
mod error;
mod events;
mod loader;
mod rql;
mod supervisor;

pub use actor::{spawn_enforcer_actor, EnforcerDeps, EnforcerHandle};
pub use authorize::{merge_leaf_keys, AuthorizationOutcome, CommandAuthorizer};
pub use condition::{CompareOp, Comparison, ConditionEvaluator, ConditionParser, ParseError, Predicate};
pub use config::EnforcementConfig;
pub use error::{EnforcementError, Result};
pub use events::{ClusterEvent, ClusterEvents, PolicyChangeTag};
pub use loader::{PolicyEnforcerResolver, PolicyIdResolver, ResolveError};
pub use rql::RqlConditionParser;
pub use supervisor::EnforcerSupervisor;
