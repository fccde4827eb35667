//! Document generation capability used by rendered-document responses.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument {
    pub content_type: String,
    pub body: Vec<u8>,
}

pub trait DocumentGenerator: Send + Sync {
    /// Render `template` with the resolved parameters and the intermediate
    /// values visible to the response (merged into one map).
    fn generate<'a>(
        &'a self,
        template: &'a str,
        parameters: &'a BTreeMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<GeneratedDocument, EngineError>> + Send + 'a>>;
}
