//! Conditional-read expressions.
//!
//! A condition gates a command on the current state of the twin. The
//! enforcement layer never evaluates the condition itself (that happens
//! at the persistence), but it must verify that the caller may READ every
//! field the condition references, otherwise the condition would leak
//! state through its outcome.
//!
//! Parsing is delegated through the [`ConditionParser`] seam; the crate
//! ships [`RqlConditionParser`](crate::RqlConditionParser) as the
//! production implementation.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use twinhive_model::{AuthorizationContext, DomainError, Permission, ResourceKey};
use twinhive_policy::CompiledEnforcer;

/// Error returned when a condition expression cannot be parsed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Comparison operators of the condition language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    In,
    Exists,
}

/// A comparison leaf referencing one field of the twin document.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Slash-separated field path, e.g. `attributes/location`.
    pub field: String,
    pub op: CompareOp,
    /// Comparison operands; empty for `exists`, multiple for `in`.
    pub values: Vec<Value>,
}

/// Parsed form of a condition expression: logical nodes over comparison
/// leaves.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Comparison(Comparison),
}

impl Predicate {
    /// All field paths referenced anywhere in the predicate, in first
    /// occurrence order.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, into: &mut Vec<&'a str>) {
        match self {
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.collect_fields(into);
                }
            }
            Predicate::Not(child) => child.collect_fields(into),
            Predicate::Comparison(comparison) => {
                if !into.contains(&comparison.field.as_str()) {
                    into.push(&comparison.field);
                }
            }
        }
    }
}

/// The external-parser seam: turns an expression string into a
/// [`Predicate`] or fails with a [`ParseError`] on malformed syntax.
pub trait ConditionParser: Send + Sync {
    fn parse(&self, expression: &str) -> Result<Predicate, ParseError>;
}

/// Checks conditional-read expressions against a compiled enforcer.
#[derive(Clone)]
pub struct ConditionEvaluator {
    parser: Arc<dyn ConditionParser>,
}

impl ConditionEvaluator {
    pub fn new(parser: Arc<dyn ConditionParser>) -> Self {
        Self { parser }
    }

    /// The set of twin resource keys the expression references.
    ///
    /// Fails with [`DomainError::ConditionInvalid`] on malformed syntax or
    /// on a field that does not form a valid pointer, naming the offender.
    pub fn referenced_resource_keys(
        &self,
        expression: &str,
    ) -> Result<HashSet<ResourceKey>, DomainError> {
        let predicate = self
            .parser
            .parse(expression)
            .map_err(|e| DomainError::condition_invalid(expression, e.to_string()))?;

        let mut keys = HashSet::new();
        for field in predicate.referenced_fields() {
            let key = ResourceKey::twin_from_str(field)
                .map_err(|e| DomainError::condition_invalid(field, e.to_string()))?;
            keys.insert(key);
        }
        Ok(keys)
    }

    /// Require unrestricted READ on every field the expression references.
    ///
    /// `on_denied` produces the specific denial (ordinary and live-channel
    /// conditions surface distinct errors).
    pub fn enforce_read_permission<F>(
        &self,
        expression: &str,
        enforcer: &CompiledEnforcer,
        ctx: &AuthorizationContext,
        on_denied: F,
    ) -> Result<(), DomainError>
    where
        F: FnOnce() -> DomainError,
    {
        let keys = self.referenced_resource_keys(expression)?;
        if !enforcer.has_unrestricted_permissions(keys.iter(), ctx, Permission::Read) {
            return Err(on_denied());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionEvaluator").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rql::RqlConditionParser;
    use twinhive_model::{
        AuthSubject, Permissions, PolicyId,
    };
    use twinhive_policy::{compile_policy, Policy, PolicyEntry, ResourceGrant};

    fn evaluator() -> ConditionEvaluator {
        ConditionEvaluator::new(Arc::new(RqlConditionParser))
    }

    fn enforcer_granting_read(keys: &[&str]) -> CompiledEnforcer {
        compile_policy(&Policy {
            id: PolicyId::parse("org.acme:p").unwrap(),
            revision: 1,
            entries: vec![PolicyEntry {
                label: "reader".to_string(),
                subjects: vec![AuthSubject::new("alice")],
                resources: keys
                    .iter()
                    .map(|key| ResourceGrant {
                        key: ResourceKey::twin_from_str(key).unwrap(),
                        grant: Permissions::READ,
                        revoke: Permissions::empty(),
                    })
                    .collect(),
            }],
        })
        .unwrap()
    }

    #[test]
    fn test_referenced_resource_keys() {
        let keys = evaluator()
            .referenced_resource_keys(
                "and(eq(attributes/location,\"kitchen\"),gt(features/temperature/value,20))",
            )
            .unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&ResourceKey::twin_from_str("/attributes/location").unwrap()));
        assert!(keys.contains(&ResourceKey::twin_from_str("/features/temperature/value").unwrap()));
    }

    #[test]
    fn test_malformed_expression_is_condition_invalid() {
        let err = evaluator()
            .referenced_resource_keys("and(eq(attributes/location")
            .unwrap_err();
        assert_eq!(err.code(), "twin:condition.invalid");
    }

    #[test]
    fn test_enforce_passes_with_read_on_all_fields() {
        let enforcer = enforcer_granting_read(&["/attributes", "/features/temperature"]);
        let ctx = AuthorizationContext::single("alice");
        let result = evaluator().enforce_read_permission(
            "and(eq(attributes/location,\"kitchen\"),exists(features/temperature/value))",
            &enforcer,
            &ctx,
            || DomainError::ConditionFailed,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_enforce_denies_on_unreadable_field() {
        let enforcer = enforcer_granting_read(&["/attributes"]);
        let ctx = AuthorizationContext::single("alice");
        let err = evaluator()
            .enforce_read_permission(
                "and(eq(attributes/location,\"kitchen\"),exists(features/temperature))",
                &enforcer,
                &ctx,
                || DomainError::ConditionFailed,
            )
            .unwrap_err();
        assert_eq!(err, DomainError::ConditionFailed);
    }
}
