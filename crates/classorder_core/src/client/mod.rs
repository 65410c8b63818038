//! Client-side mirror of container order.
//!
//! # Responsibility
//! - Apply moves to a local mirror before the server confirms them.
//! - Roll back and re-read the authoritative order when a move fails.
//!
//! # Invariants
//! - The server is the source of truth; the mirror is a display optimization.
//! - Moves are resolved against the latest (possibly optimistic) mirror.

pub mod cache;
pub mod transport;
