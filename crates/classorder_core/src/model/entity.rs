//! Ordered entity model.
//!
//! # Responsibility
//! - Describe tasks and groups living side by side in one container.
//! - Identify the scope an entity is ordered in.
//!
//! # Invariants
//! - Groups always live at top level (`group_id == None`).
//! - `order_key` is only comparable with keys of the same scope.

use crate::order::key::OrderKey;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a task or group.
pub type EntityId = Uuid;

/// Stable identifier of a container (one class).
pub type ContainerId = Uuid;

/// Optimistic-concurrency token of one container's ordering.
pub type OrderVersion = i64;

/// Kind of an ordered entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    /// Holds its own nested sequence of tasks.
    Group,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Group => "group",
        }
    }
}

/// Unit within which order keys are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The container's top-level sequence of tasks and groups.
    TopLevel,
    /// One group's nested task sequence.
    Group(EntityId),
}

impl Scope {
    pub fn group_id(self) -> Option<EntityId> {
        match self {
            Self::TopLevel => None,
            Self::Group(group_id) => Some(group_id),
        }
    }
}

impl From<Option<EntityId>> for Scope {
    fn from(value: Option<EntityId>) -> Self {
        value.map_or(Self::TopLevel, Self::Group)
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TopLevel => write!(f, "top_level"),
            Self::Group(group_id) => write!(f, "group:{group_id}"),
        }
    }
}

/// One task or group and its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub container_id: ContainerId,
    /// Enclosing group for nested tasks. `None` means top level.
    pub group_id: Option<EntityId>,
    pub order_key: OrderKey,
}

impl Entity {
    pub fn new(
        id: EntityId,
        kind: EntityKind,
        container_id: ContainerId,
        group_id: Option<EntityId>,
        order_key: OrderKey,
    ) -> Self {
        Self {
            id,
            kind,
            container_id,
            group_id,
            order_key,
        }
    }

    /// Returns the scope this entity is ordered in.
    pub fn scope(&self) -> Scope {
        Scope::from(self.group_id)
    }

    pub fn is_group(&self) -> bool {
        self.kind == EntityKind::Group
    }
}
