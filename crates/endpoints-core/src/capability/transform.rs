//! Scripted parameter transformation capability.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::EngineError;

/// Evaluates a transformation script against an input document.
///
/// The engine builds the input document and interprets the output document;
/// the script language is the implementation's concern.
pub trait ParameterTransformer: Send + Sync {
    fn transform<'a>(
        &'a self,
        script: &'a str,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, EngineError>> + Send + 'a>>;
}
