//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the sequence store contract used by the reorder service.
//! - Isolate SQLite query details from ordering logic.
//!
//! # Invariants
//! - Store APIs return semantic errors (`ContainerNotFound`, `Conflict`) in
//!   addition to DB transport errors.

pub mod sequence_repo;
