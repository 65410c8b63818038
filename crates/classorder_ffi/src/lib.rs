//! Flutter-facing bindings for the class order engine.

pub mod api;
