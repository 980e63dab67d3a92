//! JSON pointers and resource keys.
//!
//! A [`JsonPointer`] addresses a node inside an entity's JSON document.
//! A [`ResourceKey`] pairs a pointer with the kind of entity it addresses;
//! resource keys form a tree by pointer-prefix relation, which is what the
//! permission trie in the policy crate is built over.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when pointer parsing fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerParseError {
    message: String,
}

impl PointerParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PointerParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PointerParseError {}

/// A slash-separated path into a JSON document. The empty pointer is the
/// document root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JsonPointer {
    segments: Vec<String>,
}

impl JsonPointer {
    /// The document root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a pointer from its string form.
    ///
    /// Accepts `/a/b`, `a/b`, and `/` (root). Empty segments (`a//b`,
    /// trailing `/`) are rejected.
    pub fn parse(s: &str) -> Result<Self, PointerParseError> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(PointerParseError::new(format!(
                    "Invalid JSON pointer '{}': empty segment",
                    s
                )));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Extend the pointer with one segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Extend the pointer with all segments of another pointer.
    pub fn join(&self, other: &JsonPointer) -> Self {
        let mut segments = self.segments.clone();
        segments.extend_from_slice(&other.segments);
        Self { segments }
    }

    /// The parent pointer, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Whether `self` addresses an ancestor of `other` or `other` itself.
    pub fn is_prefix_of(&self, other: &JsonPointer) -> bool {
        other.segments.len() >= self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for JsonPointer {
    type Err = PointerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JsonPointer {
    type Error = PointerParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<JsonPointer> for String {
    fn from(p: JsonPointer) -> Self {
        p.to_string()
    }
}

/// The kind of entity a resource key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// A twin document.
    Twin,
    /// A policy document.
    Policy,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceType::Twin => "twin",
            ResourceType::Policy => "policy",
        };
        f.write_str(s)
    }
}

/// A node in an entity's document tree that a permission grant or revoke
/// targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub resource_type: ResourceType,
    pub path: JsonPointer,
}

impl ResourceKey {
    pub fn new(resource_type: ResourceType, path: JsonPointer) -> Self {
        Self {
            resource_type,
            path,
        }
    }

    /// A key addressing a twin document node.
    pub fn twin(path: JsonPointer) -> Self {
        Self::new(ResourceType::Twin, path)
    }

    /// Parse a twin resource key from a pointer string, as used for
    /// condition field references.
    pub fn twin_from_str(path: &str) -> Result<Self, PointerParseError> {
        Ok(Self::twin(JsonPointer::parse(path)?))
    }

    /// Extend the key's pointer with one segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        Self {
            resource_type: self.resource_type,
            path: self.path.child(segment),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.path)
    }
}
