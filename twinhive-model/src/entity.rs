//! Entity and policy identifier parsing.
//!
//! Both identifiers use the `namespace:name` form. Parsing is centralized
//! here so all callers apply consistent rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when identifier parsing fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

/// Split a `namespace:name` identifier into its parts.
///
/// The name may itself contain `:`; only the first separator is structural.
fn split_id(kind: &str, id: &str) -> Result<(String, String), IdParseError> {
    match id.split_once(':') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() => {
            Ok((ns.to_string(), name.to_string()))
        }
        _ => Err(IdParseError::new(format!(
            "Invalid {} ID '{}': expected 'namespace:name'",
            kind, id
        ))),
    }
}

/// Identifier of a governed entity (a digital twin).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    namespace: String,
    name: String,
}

impl EntityId {
    /// Parse and validate an entity ID from its `namespace:name` form.
    pub fn parse(id: &str) -> Result<Self, IdParseError> {
        let (namespace, name) = split_id("entity", id)?;
        Ok(Self { namespace, name })
    }

    /// The namespace part, used for namespace-scoped behavior
    /// (blocklists, inspection logging).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The name part.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

/// Identifier of an access-control policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PolicyId {
    namespace: String,
    name: String,
}

impl PolicyId {
    /// Parse and validate a policy ID from its `namespace:name` form.
    pub fn parse(id: &str) -> Result<Self, IdParseError> {
        let (namespace, name) = split_id("policy", id)?;
        Ok(Self { namespace, name })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl FromStr for PolicyId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PolicyId {
    type Error = IdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PolicyId> for String {
    fn from(id: PolicyId) -> Self {
        id.to_string()
    }
}
