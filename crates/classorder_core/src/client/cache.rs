//! Optimistic client cache with rollback and reconciliation.
//!
//! # Responsibility
//! - Mirror one container's order locally and apply moves immediately.
//! - Keep a pre-move snapshot per in-flight move for rollback.
//! - Re-read the authoritative order after any failed move.
//!
//! # Invariants
//! - A move that fails local resolution never reaches the transport and
//!   leaves the mirror untouched.
//! - A failed move restores its pre-move snapshot verbatim; moves sent after
//!   it lose their optimistic effect and are tracked as stale.
//! - A receipt is folded in only when it directly follows the mirror's
//!   version; otherwise the mirror is re-read from the server.

use crate::client::transport::ReorderTransport;
use crate::model::entity::{ContainerId, Entity, EntityId, Scope};
use crate::model::reorder::{ErrorKind, MoveReceipt, ReorderFailure, ReorderRequest};
use crate::order::key::allocate;
use crate::order::resolve::{resolve, ResolveError};
use crate::order::snapshot::ContainerSnapshot;
use crate::service::reorder_service::ReorderError;
use log::{debug, info, warn};
use std::collections::VecDeque;

/// Identifier of one in-flight move, increasing in send order.
pub type MoveTicket = u64;

/// Move applied locally and waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub ticket: MoveTicket,
    pub request: ReorderRequest,
}

/// Final result of one move as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Server accepted the move.
    Committed(MoveReceipt),
    /// Server rejected the move; local order was rolled back.
    RolledBack {
        failure: ReorderFailure,
        refetched: bool,
    },
    /// Move was invalid against the local mirror and never sent.
    Rejected {
        failure: ReorderFailure,
        refetched: bool,
    },
    /// A move whose optimistic effect had already been discarded failed.
    Discarded(ReorderFailure),
}

struct InFlight {
    ticket: MoveTicket,
    pre: ContainerSnapshot,
}

/// Local mirror of one container's order.
pub struct OptimisticCache<T: ReorderTransport> {
    transport: T,
    mirror: ContainerSnapshot,
    in_flight: VecDeque<InFlight>,
    next_ticket: MoveTicket,
    last_failure: Option<ReorderFailure>,
}

impl<T: ReorderTransport> OptimisticCache<T> {
    /// Creates a cache by fetching the container through `transport`.
    pub fn open(transport: T, container_id: ContainerId) -> Result<Self, ReorderFailure> {
        let snapshot = transport.fetch(container_id)?;
        Ok(Self::from_snapshot(transport, snapshot))
    }

    /// Creates a cache from an already fetched snapshot.
    pub fn from_snapshot(transport: T, snapshot: ContainerSnapshot) -> Self {
        Self {
            transport,
            mirror: snapshot,
            in_flight: VecDeque::new(),
            next_ticket: 1,
            last_failure: None,
        }
    }

    /// Current local order, including optimistic moves.
    pub fn snapshot(&self) -> &ContainerSnapshot {
        &self.mirror
    }

    /// Ids of one scope in displayed order.
    pub fn display_order(&self, scope: Scope) -> Vec<EntityId> {
        self.mirror.scope_ids(scope)
    }

    /// Number of moves sent but not yet settled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Most recent failure to show to the user.
    pub fn last_failure(&self) -> Option<&ReorderFailure> {
        self.last_failure.as_ref()
    }

    /// Clears and returns the most recent failure.
    pub fn take_failure(&mut self) -> Option<ReorderFailure> {
        self.last_failure.take()
    }

    /// Moves one entity end to end: apply locally, send, settle.
    pub fn perform_move(&mut self, request: ReorderRequest) -> MoveOutcome {
        let pending = match self.begin_move(request) {
            Ok(pending) => pending,
            Err(failure) => {
                self.last_failure = Some(failure.clone());
                let refetched = self.refetch().is_ok();
                return MoveOutcome::Rejected { failure, refetched };
            }
        };
        let outcome = self.transport.send(&pending.request);
        self.settle(pending.ticket, outcome)
    }

    /// Applies one move to the mirror and records its rollback snapshot.
    ///
    /// The caller sends `PendingMove::request` on whatever executor it uses and
    /// reports the result through [`OptimisticCache::settle`], in send order.
    ///
    /// # Errors
    /// - Resolution failures against the current mirror; the mirror is left
    ///   untouched and nothing should be sent.
    pub fn begin_move(&mut self, request: ReorderRequest) -> Result<PendingMove, ReorderFailure> {
        if request.container_id != self.mirror.container_id {
            return Err(ReorderFailure::new(
                ErrorKind::NotFound,
                format!("container not mirrored: {}", request.container_id),
            ));
        }

        let pre = self.mirror.clone();
        let moved = match place_locally(&mut self.mirror, &request) {
            Ok(entity) => entity,
            Err(failure) => {
                self.mirror = pre;
                return Err(failure);
            }
        };

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight.push_back(InFlight { ticket, pre });
        debug!(
            "event=optimistic_move module=client status=applied ticket={} scope={} in_flight={}",
            ticket,
            moved.scope(),
            self.in_flight.len()
        );
        Ok(PendingMove { ticket, request })
    }

    /// Reconciles the server outcome of one previously begun move.
    pub fn settle(
        &mut self,
        ticket: MoveTicket,
        outcome: Result<MoveReceipt, ReorderFailure>,
    ) -> MoveOutcome {
        let index = self
            .in_flight
            .iter()
            .position(|pending| pending.ticket == ticket);

        match (index, outcome) {
            (_, Ok(receipt)) => {
                if let Some(index) = index {
                    self.in_flight.remove(index);
                }
                self.apply_receipt(&receipt);
                MoveOutcome::Committed(receipt)
            }
            (Some(index), Err(failure)) => {
                let mut discarded = self.in_flight.split_off(index);
                if let Some(failed) = discarded.pop_front() {
                    self.mirror = failed.pre;
                }
                warn!(
                    "event=optimistic_rollback module=client status=rolled_back ticket={} error_code={} discarded_later={}",
                    ticket,
                    failure.kind,
                    discarded.len()
                );
                self.last_failure = Some(failure.clone());
                let refetched = self.refetch().is_ok();
                MoveOutcome::RolledBack { failure, refetched }
            }
            (None, Err(failure)) => {
                debug!(
                    "event=optimistic_rollback module=client status=stale ticket={} error_code={}",
                    ticket, failure.kind
                );
                self.last_failure = Some(failure.clone());
                MoveOutcome::Discarded(failure)
            }
        }
    }

    /// Replaces the mirror with the authoritative order.
    ///
    /// On failure the mirror is kept as is.
    pub fn refetch(&mut self) -> Result<(), ReorderFailure> {
        match self.transport.fetch(self.mirror.container_id) {
            Ok(fresh) => {
                info!(
                    "event=refetch module=client status=ok container={} version={} entities={}",
                    fresh.container_id,
                    fresh.version,
                    fresh.len()
                );
                self.mirror = fresh;
                Ok(())
            }
            Err(failure) => {
                warn!(
                    "event=refetch module=client status=error container={} error_code={}",
                    self.mirror.container_id, failure.kind
                );
                Err(failure)
            }
        }
    }

    /// Folds a committed move into the mirror.
    ///
    /// A receipt exactly one version past the mirror is this client's own
    /// write on top of state the mirror already holds. Any larger gap means
    /// another writer or a server rebalance committed in between, so the
    /// receipt's key belongs to a key space the mirror never saw.
    fn apply_receipt(&mut self, receipt: &MoveReceipt) {
        if receipt.version <= self.mirror.version {
            return;
        }
        if receipt.version == self.mirror.version + 1 {
            self.mirror.upsert(receipt.entity.clone());
            self.mirror.version = receipt.version;
            if self.mirror.keys_strictly_ascending() {
                return;
            }
        }

        debug!(
            "event=receipt_reconcile module=client status=refetch container={} mirror_version={} receipt_version={}",
            self.mirror.container_id, self.mirror.version, receipt.version
        );
        // refetch logs its own failure; the committed move stays committed.
        let _ = self.refetch();
    }
}

/// Resolves and applies one move to `mirror`, returning the moved entity.
///
/// Exhausted key space is handled by respacing the local scope and resolving
/// again; the provisional keys are replaced by server keys on receipt.
fn place_locally(
    mirror: &mut ContainerSnapshot,
    request: &ReorderRequest,
) -> Result<Entity, ReorderFailure> {
    let mut resolved = resolve(mirror, request).map_err(resolve_failure)?;
    let mut moved = mirror
        .find(request.moved_id)
        .cloned()
        .ok_or_else(|| resolve_failure(ResolveError::NotFound(request.moved_id)))?;
    if resolved.is_satisfied_by(&moved) {
        return Ok(moved);
    }

    let order_key = match allocate(resolved.before, resolved.after) {
        Ok(key) => key,
        Err(_) => {
            mirror.rebalance_scope(resolved.scope);
            resolved = resolve(mirror, request).map_err(resolve_failure)?;
            allocate(resolved.before, resolved.after)
                .map_err(|err| ReorderFailure::new(ErrorKind::Internal, err.to_string()))?
        }
    };

    moved.group_id = resolved.scope.group_id();
    moved.order_key = order_key;
    mirror.upsert(moved.clone());
    Ok(moved)
}

fn resolve_failure(err: ResolveError) -> ReorderFailure {
    ReorderError::Resolve(err).to_failure()
}
