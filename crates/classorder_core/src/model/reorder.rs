//! Reorder wire contract.
//!
//! # Responsibility
//! - Define the request a client sends to move one entity.
//! - Define the success receipt and the `{ kind, message }` failure shape.
//!
//! # Invariants
//! - `target_id` is required for `before`/`after` and optional otherwise.
//! - Every failure kind is handled the same way by the client cache.

use crate::model::entity::{ContainerId, Entity, EntityId, OrderVersion};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Drop position relative to the scope or an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Start,
    End,
    Before,
    After,
}

impl Position {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Before => "before",
            Self::After => "after",
        }
    }

    /// Parses the wire label (`start|end|before|after`, case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            _ => None,
        }
    }

    /// Whether this position is relative to an anchor.
    pub fn needs_anchor(self) -> bool {
        matches!(self, Self::Before | Self::After)
    }
}

/// One drag gesture as sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub container_id: ContainerId,
    pub moved_id: EntityId,
    pub position: Position,
    /// Anchor entity. With `start`/`end` it selects the scope instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<EntityId>,
}

impl ReorderRequest {
    pub fn new(
        container_id: ContainerId,
        moved_id: EntityId,
        position: Position,
        target_id: Option<EntityId>,
    ) -> Self {
        Self {
            container_id,
            moved_id,
            position,
            target_id,
        }
    }

    pub fn start(container_id: ContainerId, moved_id: EntityId) -> Self {
        Self::new(container_id, moved_id, Position::Start, None)
    }

    pub fn end(container_id: ContainerId, moved_id: EntityId) -> Self {
        Self::new(container_id, moved_id, Position::End, None)
    }

    pub fn before(container_id: ContainerId, moved_id: EntityId, target_id: EntityId) -> Self {
        Self::new(container_id, moved_id, Position::Before, Some(target_id))
    }

    pub fn after(container_id: ContainerId, moved_id: EntityId, target_id: EntityId) -> Self {
        Self::new(container_id, moved_id, Position::After, Some(target_id))
    }
}

/// Server acknowledgement of an applied move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveReceipt {
    /// Moved entity with its committed key and scope.
    pub entity: Entity,
    /// Container order version after the move.
    pub version: OrderVersion,
}

/// Failure category surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Moved entity or container is missing.
    NotFound,
    AnchorNotFound,
    SelfReferential,
    AmbiguousPosition,
    /// Group dropped into a group's nested list.
    InvalidScope,
    Conflict,
    Unauthorized,
    /// Request never reached the server or the reply was lost.
    Transport,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AnchorNotFound => "anchor_not_found",
            Self::SelfReferential => "self_referential",
            Self::AmbiguousPosition => "ambiguous_position",
            Self::InvalidScope => "invalid_scope",
            Self::Conflict => "conflict",
            Self::Unauthorized => "unauthorized",
            Self::Transport => "transport",
            Self::Internal => "internal",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire-level failure `{ kind, message }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl ReorderFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Display for ReorderFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Error for ReorderFailure {}
