//! Move resolution by neighbor identity.
//!
//! # Responsibility
//! - Translate a drop gesture into the neighbor keys a new key must straddle.
//! - Pick the effective scope from the anchor entity.
//!
//! # Invariants
//! - The moved entity is excluded from its scope before neighbors are read,
//!   so it can never be chosen as its own neighbor.
//! - Groups only resolve into the top-level scope.
//! - Resolution reads neighbors by id, never by a caller-supplied index.

use crate::model::entity::{Entity, EntityId, Scope};
use crate::model::reorder::{Position, ReorderRequest};
use crate::order::key::OrderKey;
use crate::order::snapshot::ContainerSnapshot;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Errors from move resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Moved entity is not in the snapshot.
    NotFound(EntityId),
    /// Anchor entity is not in the snapshot (for example, concurrently deleted).
    AnchorNotFound(EntityId),
    /// Anchor and moved entity are the same.
    SelfReferential(EntityId),
    /// `before`/`after` without an anchor.
    AmbiguousPosition(Position),
    /// A group cannot be placed inside another group.
    InvalidScope { moved_id: EntityId, scope: Scope },
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "moved entity not found: {id}"),
            Self::AnchorNotFound(id) => write!(f, "anchor entity not found: {id}"),
            Self::SelfReferential(id) => {
                write!(f, "entity cannot be positioned relative to itself: {id}")
            }
            Self::AmbiguousPosition(position) => {
                write!(f, "position `{}` requires a target id", position.as_str())
            }
            Self::InvalidScope { moved_id, scope } => {
                write!(f, "group {moved_id} cannot be placed in scope {scope}")
            }
        }
    }
}

impl Error for ResolveError {}

/// Target scope plus the neighbor keys a new key must fall between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedMove {
    pub scope: Scope,
    pub before: Option<OrderKey>,
    pub after: Option<OrderKey>,
}

impl ResolvedMove {
    /// Whether `entity` already sits at the resolved position.
    pub fn is_satisfied_by(&self, entity: &Entity) -> bool {
        entity.scope() == self.scope
            && self.before.map_or(true, |key| key < entity.order_key)
            && self.after.map_or(true, |key| entity.order_key < key)
    }
}

/// Resolves neighbor keys within one ordered scope.
///
/// `scope_entities` must be sorted ascending by key. The moved entity may or
/// may not be part of it; it is filtered out before neighbors are read.
///
/// # Errors
/// - `SelfReferential` when `target_id == moved_id`.
/// - `AmbiguousPosition` when `before`/`after` is requested without target.
/// - `AnchorNotFound` when the target is not in `scope_entities`.
pub fn resolve_in_scope(
    scope_entities: &[Entity],
    moved_id: EntityId,
    position: Position,
    target_id: Option<EntityId>,
) -> ResolveResult<(Option<OrderKey>, Option<OrderKey>)> {
    if target_id == Some(moved_id) {
        return Err(ResolveError::SelfReferential(moved_id));
    }

    let remaining: Vec<&Entity> = scope_entities
        .iter()
        .filter(|entity| entity.id != moved_id)
        .collect();

    match position {
        Position::Start => Ok((None, remaining.first().map(|entity| entity.order_key))),
        Position::End => Ok((remaining.last().map(|entity| entity.order_key), None)),
        Position::Before | Position::After => {
            let target_id = target_id.ok_or(ResolveError::AmbiguousPosition(position))?;
            let index = remaining
                .iter()
                .position(|entity| entity.id == target_id)
                .ok_or(ResolveError::AnchorNotFound(target_id))?;
            let anchor = remaining[index].order_key;
            if position == Position::Before {
                let predecessor = index
                    .checked_sub(1)
                    .map(|previous| remaining[previous].order_key);
                Ok((predecessor, Some(anchor)))
            } else {
                let successor = remaining.get(index + 1).map(|entity| entity.order_key);
                Ok((Some(anchor), successor))
            }
        }
    }
}

/// Resolves a reorder request against a whole container snapshot.
///
/// The anchor decides the scope: a task anchor selects its enclosing scope, a
/// group anchor means top level for `before`/`after` and the group's own
/// nested list for `start`/`end`. Without an anchor, `start`/`end` address the
/// top level.
pub fn resolve(
    snapshot: &ContainerSnapshot,
    request: &ReorderRequest,
) -> ResolveResult<ResolvedMove> {
    let moved = snapshot
        .find(request.moved_id)
        .ok_or(ResolveError::NotFound(request.moved_id))?;
    if request.target_id == Some(moved.id) {
        return Err(ResolveError::SelfReferential(moved.id));
    }

    let anchor = match request.target_id {
        Some(target_id) => Some(
            snapshot
                .find(target_id)
                .ok_or(ResolveError::AnchorNotFound(target_id))?,
        ),
        None if request.position.needs_anchor() => {
            return Err(ResolveError::AmbiguousPosition(request.position));
        }
        None => None,
    };

    let scope = match (request.position, anchor) {
        (_, None) => Scope::TopLevel,
        (Position::Start | Position::End, Some(anchor)) if anchor.is_group() => {
            Scope::Group(anchor.id)
        }
        (_, Some(anchor)) => anchor.scope(),
    };
    if moved.is_group() && scope != Scope::TopLevel {
        return Err(ResolveError::InvalidScope {
            moved_id: moved.id,
            scope,
        });
    }

    let scope_anchor = if request.position.needs_anchor() {
        request.target_id
    } else {
        None
    };
    let (before, after) = resolve_in_scope(
        snapshot.scope_entities(scope),
        moved.id,
        request.position,
        scope_anchor,
    )?;

    Ok(ResolvedMove {
        scope,
        before,
        after,
    })
}
