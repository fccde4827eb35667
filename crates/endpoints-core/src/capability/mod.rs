//! External collaborators consumed by the engine.
//!
//! Each trait is object-safe (boxed futures) so the engine can hold the
//! configured implementation as `Arc<dyn ...>` chosen at runtime.

pub mod document;
pub mod http;
pub mod transform;

pub use document::{DocumentGenerator, GeneratedDocument};
pub use http::{HttpClient, HttpRequest, HttpResponse};
pub use transform::ParameterTransformer;
