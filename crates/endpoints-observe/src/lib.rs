//! Observability setup for the endpoints engine.

pub mod tracing_setup;
