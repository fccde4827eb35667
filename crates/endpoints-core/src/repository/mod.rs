//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (endpoints-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod request_store;

pub use request_store::{AttemptTransaction, CounterWindow, RequestStore};
