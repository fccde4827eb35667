//! Outbound HTTP for http-request tasks.

pub mod client;

pub use client::{DEFAULT_TIMEOUT, ReqwestHttpClient};
