//! Shared domain types for the endpoints engine.
//!
//! This crate contains the declarations the engine executes (applications,
//! endpoints, tasks, responses), the audit-log record, the deployment
//! configuration, and the error types shared across layers.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod application;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod request_log;
