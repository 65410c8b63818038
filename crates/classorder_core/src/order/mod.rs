//! Ordering engine: key allocation, snapshots and move resolution.
//!
//! # Responsibility
//! - Keep ordering logic pure and independent of storage and transport.
//! - Share one resolver between the server-side service and client mirror.
//!
//! # Invariants
//! - Keys are only compared within one scope.
//! - Nothing in this module performs I/O.

pub mod key;
pub mod resolve;
pub mod snapshot;
