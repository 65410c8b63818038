//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate resolver, allocator and store into the reorder use case.
//! - Keep FFI and client layers decoupled from storage details.

pub mod reorder_service;
