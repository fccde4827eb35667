//! Request execution engine for declaratively configured endpoints.
//!
//! An endpoint resolves its parameters (optionally through a transformation
//! script), runs a graph of tasks exchanging intermediate values, and produces
//! one response. Every request is audited in the request log under a
//! per-(application, environment) lock that also serializes the allocation of
//! counters and ids.
//!
//! Storage and external collaborators are traits here; `endpoints-infra`
//! provides the SQLite, HTTP, HMAC and transformation implementations.

pub mod allocation;
pub mod auth;
pub mod capability;
pub mod engine;
pub mod error;
pub mod execution;
pub mod repository;

#[cfg(test)]
mod test_support;
