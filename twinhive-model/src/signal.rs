//! Command and response signals for the twin domain.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityId;
use crate::headers::RequestHeaders;
use crate::pointer::JsonPointer;

/// The operation a command performs at its resource path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandKind {
    /// Create the entity with the given initial document.
    Create { entity: Value },
    /// Replace the value at the command path.
    Modify { value: Value },
    /// Merge-patch the value at the command path (RFC 7396 semantics).
    Merge { patch: Value },
    /// Delete the value at the command path.
    Delete,
    /// Read the value at the command path.
    Retrieve,
}

/// Coarse command classification used by the authorization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCategory {
    Query,
    Modify,
    Merge,
    Create,
    Delete,
}

/// A command addressed at (a part of) a twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinCommand {
    pub entity_id: EntityId,
    /// The resource path the command operates on; root for whole-entity
    /// commands.
    pub path: JsonPointer,
    pub kind: CommandKind,
    pub headers: RequestHeaders,
}

impl TwinCommand {
    pub fn new(
        entity_id: EntityId,
        path: JsonPointer,
        kind: CommandKind,
        headers: RequestHeaders,
    ) -> Self {
        Self {
            entity_id,
            path,
            kind,
            headers,
        }
    }

    pub fn category(&self) -> CommandCategory {
        match self.kind {
            CommandKind::Create { .. } => CommandCategory::Create,
            CommandKind::Modify { .. } => CommandCategory::Modify,
            CommandKind::Merge { .. } => CommandCategory::Merge,
            CommandKind::Delete => CommandCategory::Delete,
            CommandKind::Retrieve => CommandCategory::Query,
        }
    }

    /// Whether the command reads rather than changes state.
    pub fn is_query(&self) -> bool {
        self.category() == CommandCategory::Query
    }

    /// The signal type string used in logs and error descriptions.
    pub fn signal_type(&self) -> &'static str {
        match self.kind {
            CommandKind::Create { .. } => "twin.commands:create",
            CommandKind::Modify { .. } => "twin.commands:modify",
            CommandKind::Merge { .. } => "twin.commands:merge",
            CommandKind::Delete => "twin.commands:delete",
            CommandKind::Retrieve => "twin.commands:retrieve",
        }
    }

    pub fn with_headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = headers;
        self
    }
}

/// Whether a response answers a query or acknowledges a modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Query,
    Modify,
}

/// A response travelling back toward the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinResponse {
    pub entity_id: EntityId,
    /// The resource path the response's entity is rooted at.
    pub path: JsonPointer,
    /// The response payload; query responses carry the retrieved document.
    pub entity: Option<Value>,
    pub kind: ResponseKind,
    pub headers: RequestHeaders,
}

impl TwinResponse {
    pub fn query(
        entity_id: EntityId,
        path: JsonPointer,
        entity: Value,
        headers: RequestHeaders,
    ) -> Self {
        Self {
            entity_id,
            path,
            entity: Some(entity),
            kind: ResponseKind::Query,
            headers,
        }
    }

    pub fn modified(entity_id: EntityId, path: JsonPointer, headers: RequestHeaders) -> Self {
        Self {
            entity_id,
            path,
            entity: None,
            kind: ResponseKind::Modify,
            headers,
        }
    }

    pub fn signal_type(&self) -> &'static str {
        match self.kind {
            ResponseKind::Query => "twin.responses:retrieve",
            ResponseKind::Modify => "twin.responses:modify",
        }
    }
}
