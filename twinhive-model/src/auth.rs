//! Authorization subjects and contexts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque authenticated identity, e.g. `iot-suite:alice`.
///
/// Subjects are compared literally; no hierarchy or wildcard semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthSubject(String);

impl AuthSubject {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AuthSubject {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AuthSubject {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The ordered, non-empty set of subjects a caller authenticated as.
///
/// Order is precedence order: earlier subjects win where grants conflict.
/// An empty context cannot be constructed; callers without any
/// authenticated subject take the explicit public-bypass path instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AuthSubject>", into = "Vec<AuthSubject>")]
pub struct AuthorizationContext {
    subjects: Vec<AuthSubject>,
}

impl AuthorizationContext {
    /// Build a context from subjects, preserving order and dropping
    /// duplicates after their first occurrence.
    ///
    /// Returns `None` for an empty subject list.
    pub fn new<I, S>(subjects: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<AuthSubject>,
    {
        let mut seen = Vec::new();
        for subject in subjects {
            let subject = subject.into();
            if !seen.contains(&subject) {
                seen.push(subject);
            }
        }
        if seen.is_empty() {
            None
        } else {
            Some(Self { subjects: seen })
        }
    }

    /// Single-subject convenience constructor.
    pub fn single(subject: impl Into<AuthSubject>) -> Self {
        Self {
            subjects: vec![subject.into()],
        }
    }

    pub fn subjects(&self) -> &[AuthSubject] {
        &self.subjects
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuthSubject> {
        self.subjects.iter()
    }

    pub fn contains(&self, subject: &AuthSubject) -> bool {
        self.subjects.contains(subject)
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl TryFrom<Vec<AuthSubject>> for AuthorizationContext {
    type Error = String;

    fn try_from(subjects: Vec<AuthSubject>) -> Result<Self, Self::Error> {
        Self::new(subjects).ok_or_else(|| "authorization context must not be empty".to_string())
    }
}

impl From<AuthorizationContext> for Vec<AuthSubject> {
    fn from(ctx: AuthorizationContext) -> Self {
        ctx.subjects
    }
}
