//! # Twinhive Model
//!
//! Shared domain model for the twinhive enforcement stack.
//!
//! This crate provides:
//! - Identifiers: [`EntityId`], [`PolicyId`]
//! - Authorization primitives: [`AuthSubject`], [`AuthorizationContext`],
//!   [`Permission`], [`Permissions`]
//! - Resource addressing: [`JsonPointer`], [`ResourceKey`]
//! - Signals: [`TwinCommand`], [`TwinResponse`] and their [`RequestHeaders`]
//! - The user-visible error taxonomy: [`DomainError`]
//!
//! ## Design Principles
//!
//! 1. **Pure data**: no I/O, no async, no runtime dependency
//! 2. **Validated at the edges**: identifiers and pointers are parsed once
//!    and carry their invariants from then on
//! 3. **Stable error codes**: every [`DomainError`] exposes a
//!    machine-readable code plus a remediation hint, and internal causes
//!    never leak into user-facing text

pub mod auth;
pub mod entity;
pub mod error;
pub mod headers;
pub mod permission;
pub mod pointer;
pub mod signal;

pub use auth::{AuthSubject, AuthorizationContext};
pub use entity::{EntityId, IdParseError, PolicyId};
pub use error::DomainError;
pub use headers::{Channel, RequestHeaders, CONTENT_TYPE_TD_JSON};
pub use permission::{Permission, Permissions};
pub use pointer::{JsonPointer, PointerParseError, ResourceKey, ResourceType};
pub use signal::{CommandCategory, CommandKind, ResponseKind, TwinCommand, TwinResponse};
