//! JEXL parameter transformations.
//!
//! A transformation script is one JEXL expression evaluated with the input
//! document as its context; the value it produces is the output document.
//!
//! ```text
//! {parameters: {order: input_from_request.parameters.order|trim, month: data_sources[0].value}}
//! ```
//!
//! The request document is always passed as context, never interpolated into
//! the expression.

use std::future::Future;
use std::pin::Pin;

use endpoints_core::capability::ParameterTransformer;
use endpoints_core::error::EngineError;
use serde_json::{Value, json};

/// Evaluates transformation scripts with `jexl-eval`. The evaluator is built
/// per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct JexlTransformer;

impl JexlTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `script` against `input` synchronously.
    pub fn evaluate(&self, script: &str, input: &Value) -> Result<Value, EngineError> {
        if !input.is_object() {
            return Err(EngineError::TransformationFailed(
                "input document must be a JSON object".to_string(),
            ));
        }
        evaluator()
            .eval_in_context(script, input)
            .map_err(|e| EngineError::TransformationFailed(e.to_string()))
    }
}

impl ParameterTransformer for JexlTransformer {
    fn transform<'a>(
        &'a self,
        script: &'a str,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, EngineError>> + Send + 'a>> {
        Box::pin(async move { self.evaluate(script, &input) })
    }
}

fn first_str(args: &[Value]) -> &str {
    args.first().and_then(|v| v.as_str()).unwrap_or("")
}

fn evaluator() -> jexl_eval::Evaluator<'static> {
    jexl_eval::Evaluator::new()
        .with_transform("lower", |args: &[Value]| Ok(json!(first_str(args).to_lowercase())))
        .with_transform("upper", |args: &[Value]| Ok(json!(first_str(args).to_uppercase())))
        .with_transform("trim", |args: &[Value]| Ok(json!(first_str(args).trim())))
        .with_transform("split", |args: &[Value]| {
            let delimiter = args.get(1).and_then(|v| v.as_str()).unwrap_or(",");
            let parts: Vec<&str> = first_str(args).split(delimiter).collect();
            Ok(json!(parts))
        })
        .with_transform("join", |args: &[Value]| {
            let delimiter = args.get(1).and_then(|v| v.as_str()).unwrap_or(",");
            let parts: Vec<String> = args
                .first()
                .and_then(|v| v.as_array())
                .map(|items| items.iter().map(scalar_text).collect())
                .unwrap_or_default();
            Ok(json!(parts.join(delimiter)))
        })
        .with_transform("string", |args: &[Value]| {
            Ok(json!(args.first().map(scalar_text).unwrap_or_default()))
        })
        .with_transform("number", |args: &[Value]| {
            let parsed = match args.first() {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            Ok(parsed.map_or(Value::Null, |n| json!(n)))
        })
        .with_transform("length", |args: &[Value]| {
            let len = match args.first() {
                Some(Value::String(s)) => s.chars().count(),
                Some(Value::Array(a)) => a.len(),
                Some(Value::Object(o)) => o.len(),
                _ => 0,
            };
            Ok(json!(len as f64))
        })
        .with_transform("default", |args: &[Value]| {
            let value = args.first().cloned().unwrap_or(Value::Null);
            let fallback = args.get(1).cloned().unwrap_or(Value::Null);
            Ok(match value {
                Value::Null => fallback,
                Value::String(ref s) if s.is_empty() => fallback,
                other => other,
            })
        })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> Value {
        json!({
            "input_from_request": {
                "debug_requested": false,
                "parameters": { "order": "  A-7 ", "tags": "x;y" }
            },
            "input_from_application": { "application": "shop", "incremental_id_per_endpoint": 4 },
            "data_sources": [ { "type": "on-demand-counter", "counter": "month", "value": 12 } ]
        })
    }

    #[tokio::test]
    async fn test_transform_produces_parameters() {
        let script = "{parameters: {order: input_from_request.parameters.order|trim|lower, month: data_sources[0].value}}";
        let output = JexlTransformer.transform(script, input()).await.unwrap();
        assert_eq!(output["parameters"]["order"], "a-7");
        assert_eq!(output["parameters"]["month"], 12.0);
    }

    #[test]
    fn test_transform_can_report_error() {
        let script = "input_from_application.incremental_id_per_endpoint > 3 ? {error: 'sold out'} : {parameters: {}}";
        let output = JexlTransformer.evaluate(script, &input()).unwrap();
        assert_eq!(output, json!({ "error": "sold out" }));
    }

    #[test]
    fn test_split_and_join() {
        let script = "input_from_request.parameters.tags|split(';')|join('+')";
        let output = JexlTransformer.evaluate(script, &input()).unwrap();
        assert_eq!(output, json!("x+y"));
    }

    #[test]
    fn test_invalid_script_is_transformation_failure() {
        let err = JexlTransformer.evaluate("{{{", &input()).unwrap_err();
        assert!(matches!(err, EngineError::TransformationFailed(_)));

        let err = JexlTransformer.evaluate("1", &json!([1])).unwrap_err();
        assert!(matches!(err, EngineError::TransformationFailed(_)));
    }
}
