//! Parameter transformation and document rendering adapters.

pub mod document;
pub mod jexl;

pub use document::TemplateDocumentGenerator;
pub use jexl::JexlTransformer;
