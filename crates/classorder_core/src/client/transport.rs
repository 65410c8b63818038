//! Transport seam between the client cache and the reorder service.

use crate::model::entity::ContainerId;
use crate::model::reorder::{MoveReceipt, ReorderFailure, ReorderRequest};
use crate::order::snapshot::ContainerSnapshot;
use crate::repo::sequence_repo::SequenceStore;
use crate::service::reorder_service::{AccessGuard, AllowAll, ReorderService};

/// Carries reorder mutations and container reads to the server.
///
/// Implementations decide how the call is scheduled; the cache only needs the
/// outcome of each request, delivered in send order.
pub trait ReorderTransport {
    /// Sends one reorder mutation.
    fn send(&self, request: &ReorderRequest) -> Result<MoveReceipt, ReorderFailure>;
    /// Reads the authoritative order of one container.
    fn fetch(&self, container_id: ContainerId) -> Result<ContainerSnapshot, ReorderFailure>;
}

impl<T: ReorderTransport + ?Sized> ReorderTransport for &T {
    fn send(&self, request: &ReorderRequest) -> Result<MoveReceipt, ReorderFailure> {
        (**self).send(request)
    }

    fn fetch(&self, container_id: ContainerId) -> Result<ContainerSnapshot, ReorderFailure> {
        (**self).fetch(container_id)
    }
}

/// In-process transport calling a `ReorderService` directly.
pub struct LocalTransport<S: SequenceStore, G: AccessGuard = AllowAll> {
    service: ReorderService<S, G>,
}

impl<S: SequenceStore, G: AccessGuard> LocalTransport<S, G> {
    pub fn new(service: ReorderService<S, G>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &ReorderService<S, G> {
        &self.service
    }
}

impl<S: SequenceStore, G: AccessGuard> ReorderTransport for LocalTransport<S, G> {
    fn send(&self, request: &ReorderRequest) -> Result<MoveReceipt, ReorderFailure> {
        self.service.reorder(request).map_err(|err| err.to_failure())
    }

    fn fetch(&self, container_id: ContainerId) -> Result<ContainerSnapshot, ReorderFailure> {
        self.service
            .load(container_id)
            .map_err(|err| err.to_failure())
    }
}
