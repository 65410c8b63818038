//! Reorder use-case service.
//!
//! # Responsibility
//! - Turn one reorder request into one versioned single-row store write.
//! - Recover from key space exhaustion with one scope rebalance and retry.
//! - Map every failure onto the wire error taxonomy.
//!
//! # Invariants
//! - Resolution always runs against a snapshot read in this call; a retry
//!   after rebalance re-reads and re-resolves by anchor identity.
//! - `KeySpaceExhausted` never escapes unless the retry itself exhausts.
//! - Stale snapshots surface as `Conflict`; the service never re-applies a
//!   key computed from an older version.

use crate::model::entity::ContainerId;
use crate::model::reorder::{ErrorKind, MoveReceipt, ReorderFailure, ReorderRequest};
use crate::order::key::{allocate, KeySpaceExhausted};
use crate::order::resolve::{resolve, ResolveError};
use crate::order::snapshot::ContainerSnapshot;
use crate::repo::sequence_repo::{MoveCommit, SequenceRepoError, SequenceStore};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors from reorder service operations.
#[derive(Debug)]
pub enum ReorderError {
    Resolve(ResolveError),
    /// Rebalance did not free any room; not expected in practice.
    KeySpaceExhausted(KeySpaceExhausted),
    /// Caller may not reorder this container.
    Unauthorized(ContainerId),
    Repo(SequenceRepoError),
}

impl ReorderError {
    /// Wire category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolve(ResolveError::NotFound(_)) => ErrorKind::NotFound,
            Self::Resolve(ResolveError::AnchorNotFound(_)) => ErrorKind::AnchorNotFound,
            Self::Resolve(ResolveError::SelfReferential(_)) => ErrorKind::SelfReferential,
            Self::Resolve(ResolveError::AmbiguousPosition(_)) => ErrorKind::AmbiguousPosition,
            Self::Resolve(ResolveError::InvalidScope { .. }) => ErrorKind::InvalidScope,
            Self::KeySpaceExhausted(_) => ErrorKind::Internal,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Repo(err) => match err {
                SequenceRepoError::ContainerNotFound(_)
                | SequenceRepoError::EntityNotFound(_)
                | SequenceRepoError::GroupNotFound(_) => ErrorKind::NotFound,
                SequenceRepoError::InvalidScope { .. } => ErrorKind::InvalidScope,
                SequenceRepoError::Conflict { .. } | SequenceRepoError::KeyCollision { .. } => {
                    ErrorKind::Conflict
                }
                _ => ErrorKind::Internal,
            },
        }
    }

    /// Converts into the `{ kind, message }` wire shape.
    pub fn to_failure(&self) -> ReorderFailure {
        ReorderFailure::new(self.kind(), self.to_string())
    }
}

impl Display for ReorderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve(err) => write!(f, "{err}"),
            Self::KeySpaceExhausted(err) => write!(f, "{err}"),
            Self::Unauthorized(id) => write!(f, "not allowed to reorder container {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReorderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Resolve(err) => Some(err),
            Self::KeySpaceExhausted(err) => Some(err),
            Self::Unauthorized(_) => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<ResolveError> for ReorderError {
    fn from(value: ResolveError) -> Self {
        Self::Resolve(value)
    }
}

impl From<SequenceRepoError> for ReorderError {
    fn from(value: SequenceRepoError) -> Self {
        Self::Repo(value)
    }
}

/// Decides whether the current caller may reorder a container.
///
/// Identity and roles live outside this crate; embedders plug their own check.
pub trait AccessGuard {
    fn may_reorder(&self, container_id: ContainerId) -> bool;
}

/// Guard that admits every container.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessGuard for AllowAll {
    fn may_reorder(&self, _container_id: ContainerId) -> bool {
        true
    }
}

impl<F: Fn(ContainerId) -> bool> AccessGuard for F {
    fn may_reorder(&self, container_id: ContainerId) -> bool {
        self(container_id)
    }
}

/// Reorder service facade.
pub struct ReorderService<S: SequenceStore, G: AccessGuard = AllowAll> {
    store: S,
    guard: G,
}

impl<S: SequenceStore> ReorderService<S> {
    /// Creates service admitting every container.
    pub fn new(store: S) -> Self {
        Self::with_guard(store, AllowAll)
    }
}

impl<S: SequenceStore, G: AccessGuard> ReorderService<S, G> {
    /// Creates service with a custom access check.
    pub fn with_guard(store: S, guard: G) -> Self {
        Self { store, guard }
    }

    /// Underlying sequence store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reads the authoritative order of one container.
    pub fn load(&self, container_id: ContainerId) -> Result<ContainerSnapshot, ReorderError> {
        if !self.guard.may_reorder(container_id) {
            return Err(ReorderError::Unauthorized(container_id));
        }
        self.store.load_container(container_id).map_err(Into::into)
    }

    /// Moves one entity and returns its committed key and scope.
    ///
    /// # Errors
    /// - Resolution errors for missing, self-referential or ambiguous anchors.
    /// - `Conflict` kinds when the container changed concurrently; callers
    ///   must re-fetch and issue a fresh request.
    pub fn reorder(&self, request: &ReorderRequest) -> Result<MoveReceipt, ReorderError> {
        let started_at = Instant::now();
        let result = self.try_reorder(request);
        match &result {
            Ok(receipt) => info!(
                "event=reorder module=service status=ok container={} position={} scope={} version={} duration_ms={}",
                request.container_id,
                request.position.as_str(),
                receipt.entity.scope(),
                receipt.version,
                started_at.elapsed().as_millis()
            ),
            Err(err) if err.kind() == ErrorKind::Internal => error!(
                "event=reorder module=service status=error container={} error_code={} error={}",
                request.container_id,
                err.kind(),
                err
            ),
            Err(err) => warn!(
                "event=reorder module=service status=rejected container={} error_code={}",
                request.container_id,
                err.kind()
            ),
        }
        result
    }

    fn try_reorder(&self, request: &ReorderRequest) -> Result<MoveReceipt, ReorderError> {
        let mut snapshot = self.load(request.container_id)?;
        let mut resolved = resolve(&snapshot, request)?;

        if let Some(moved) = snapshot.find(request.moved_id) {
            if resolved.is_satisfied_by(moved) {
                return Ok(MoveReceipt {
                    entity: moved.clone(),
                    version: snapshot.version,
                });
            }
        }

        let order_key = match allocate(resolved.before, resolved.after) {
            Ok(key) => key,
            Err(exhausted) => {
                warn!(
                    "event=reorder module=service status=rebalance container={} scope={}",
                    request.container_id, resolved.scope
                );
                self.store.rebalance_scope(
                    request.container_id,
                    resolved.scope,
                    snapshot.version,
                )?;
                snapshot = self.store.load_container(request.container_id)?;
                resolved = resolve(&snapshot, request)?;
                allocate(resolved.before, resolved.after).map_err(|retry| {
                    warn!("event=reorder module=service status=exhausted first={exhausted}");
                    ReorderError::KeySpaceExhausted(retry)
                })?
            }
        };

        let receipt = self.store.apply_move(&MoveCommit {
            container_id: request.container_id,
            entity_id: request.moved_id,
            scope: resolved.scope,
            order_key,
            expected_version: snapshot.version,
        })?;
        Ok(receipt)
    }
}
