//! Endpoint execution: parameter resolution, tasks, responses and the
//! request lifecycle.

mod attempt;
pub mod orchestrator;
pub mod parameters;
pub mod pattern;
pub mod request;
pub mod response;
pub mod task;
pub mod transformation;

pub use orchestrator::{Collaborators, EndpointEngine};
pub use request::{BufferedResponse, ContentKind, ExecutionRequest, FORWARD_USER_AGENT};
