//! Domain model for ordered class content.
//!
//! # Responsibility
//! - Define the entity shape shared by store, resolver and client cache.
//! - Define the reorder wire contract exchanged between client and server.
//!
//! # Invariants
//! - Every entity is identified by a stable `EntityId`.
//! - Group membership is an attribute of the entity, never part of its key.

pub mod entity;
pub mod reorder;
