//! Unified ordering and reorder engine for class content.
//! Tasks and groups of tasks share one total order per class; this crate owns
//! the ordering invariants, the versioned store and the optimistic client mirror.

pub mod client;
pub mod db;
pub mod logging;
pub mod model;
pub mod order;
pub mod repo;
pub mod service;

pub use client::cache::{MoveOutcome, MoveTicket, OptimisticCache, PendingMove};
pub use client::transport::{LocalTransport, ReorderTransport};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entity::{ContainerId, Entity, EntityId, EntityKind, OrderVersion, Scope};
pub use model::reorder::{ErrorKind, MoveReceipt, Position, ReorderFailure, ReorderRequest};
pub use order::key::{allocate, KeySpaceExhausted, OrderKey, KEY_STEP};
pub use order::resolve::{resolve, resolve_in_scope, ResolveError, ResolvedMove};
pub use order::snapshot::ContainerSnapshot;
pub use repo::sequence_repo::{
    MoveCommit, SequenceRepoError, SequenceRepoResult, SequenceStore, SqliteSequenceStore,
};
pub use service::reorder_service::{AccessGuard, AllowAll, ReorderError, ReorderService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
