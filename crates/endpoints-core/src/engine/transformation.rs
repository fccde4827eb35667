//! Parameter transformation documents.
//!
//! The engine builds the input document, hands it to the configured
//! `ParameterTransformer`, and reads the parameters back from the output
//! document.
//!
//! Input:
//!
//! ```json
//! {
//!   "input_from_request": {
//!     "debug_requested": false,
//!     "parameters": { "name": "value" },   // or "body": <request JSON>
//!     "user_agent": "...",
//!     "ip_address": "..."
//!   },
//!   "input_from_application": {
//!     "application": "shop",
//!     "application_display_name": "Shop",
//!     "debug_allowed": false,
//!     "secret_key": "...",
//!     "incremental_id_per_endpoint": 7,
//!     "random_id_per_application": 1234567890
//!   },
//!   "data_sources": [ ... ]
//! }
//! ```
//!
//! Output: `{ "error": "..." }` or `{ "parameters": { "name": "value" } }`.

use std::collections::BTreeMap;

use endpoints_types::application::Application;
use endpoints_types::endpoint::Endpoint;
use endpoints_types::request_log::{CounterKind, RandomRequestId, RequestLogRecord};
use serde_json::{Map, Value, json};

use crate::error::EngineError;

/// Debug-logged documents longer than this are truncated.
const DEBUG_LOG_LIMIT: usize = 20_000;
const DEBUG_LOG_KEEP: usize = 10_000;

/// What the request contributes to the input document.
#[derive(Debug, Clone)]
pub enum RequestPayload {
    Parameters(BTreeMap<String, String>),
    Body(Value),
}

#[derive(Debug, Clone)]
pub struct ApplicationInput {
    pub application: String,
    pub display_name: Option<String>,
    pub debug_allowed: bool,
    pub secret_key: Option<String>,
    pub incremental_id_per_endpoint: i64,
    pub random_id_per_application: RandomRequestId,
}

pub fn input_document(
    payload: &RequestPayload,
    debug_requested: bool,
    user_agent: Option<&str>,
    ip_address: Option<&str>,
    application: &ApplicationInput,
    data_sources: Vec<Value>,
) -> Value {
    let mut from_request = Map::new();
    from_request.insert("debug_requested".into(), json!(debug_requested));
    match payload {
        RequestPayload::Parameters(parameters) => {
            from_request.insert("parameters".into(), json!(parameters));
        }
        RequestPayload::Body(body) => {
            from_request.insert("body".into(), body.clone());
        }
    }
    if let Some(user_agent) = user_agent {
        from_request.insert("user_agent".into(), json!(user_agent));
    }
    if let Some(ip_address) = ip_address {
        from_request.insert("ip_address".into(), json!(ip_address));
    }

    json!({
        "input_from_request": from_request,
        "input_from_application": {
            "application": application.application,
            "application_display_name": application.display_name,
            "debug_allowed": application.debug_allowed,
            "secret_key": application.secret_key,
            "incremental_id_per_endpoint": application.incremental_id_per_endpoint,
            "random_id_per_application": application.random_id_per_application.value(),
        },
        "data_sources": data_sources,
    })
}

/// Result document of an on-demand-counter data source.
pub fn counter_source(counter: CounterKind, value: i64) -> Value {
    json!({
        "type": "on-demand-counter",
        "counter": counter,
        "value": value,
    })
}

/// Result document of a request-log data source.
pub fn request_log_source(rows: &[RequestLogRecord]) -> Result<Value, EngineError> {
    let rows = serde_json::to_value(rows)
        .map_err(|e| EngineError::Internal(format!("failed to serialize request log: {e}")))?;
    Ok(json!({ "type": "request-log", "rows": rows }))
}

/// Result document of an application-introspection data source.
///
/// Publishes the flattened endpoint definitions. Secret keys are left out.
pub fn application_source(application: &Application) -> Result<Value, EngineError> {
    let endpoints = serde_json::to_value(&application.endpoints)
        .map_err(|e| EngineError::Internal(format!("failed to serialize endpoints: {e}")))?;
    Ok(json!({
        "type": "application-introspection",
        "application": application.name,
        "display_name": application.display_name,
        "timezone": application.timezone.name(),
        "endpoints": endpoints,
    }))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read the parameters from a transformation output document.
pub fn parse_output(endpoint: &Endpoint, output: &Value) -> Result<BTreeMap<String, String>, EngineError> {
    let Value::Object(root) = output else {
        return Err(EngineError::request_invalid(
            "Parameter transformation delivered no output object",
        ));
    };

    if let Some(error) = root.get("error") {
        let error = scalar_to_string(error).unwrap_or_else(|| error.to_string());
        return Err(EngineError::TransformationReportedError { error });
    }

    if let Some(other) = root.keys().find(|k| k.as_str() != "parameters") {
        return Err(EngineError::request_invalid(format!(
            "Parameter transformation produced unexpected key '{other}'"
        )));
    }

    let mut parameters = BTreeMap::new();
    let Some(produced) = root.get("parameters") else {
        return Ok(parameters);
    };
    let Value::Object(produced) = produced else {
        return Err(EngineError::request_invalid(
            "Parameter transformation produced 'parameters' that is not an object",
        ));
    };

    for (name, value) in produced {
        if !endpoint.parameters.contains_key(name) {
            return Err(EngineError::request_invalid(format!(
                "Parameter transformation produced parameter '{name}' but this parameter isn't declared"
            )));
        }
        let value = scalar_to_string(value).ok_or_else(|| {
            EngineError::request_invalid(format!(
                "Parameter transformation produced a non-scalar value for '{name}'"
            ))
        })?;
        parameters.insert(name.clone(), value);
    }
    Ok(parameters)
}

/// Pretty-printed document, keeping only the head and tail of long output.
pub fn document_for_log(document: &Value) -> String {
    let pretty = serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string());
    let length = pretty.chars().count();
    if length <= DEBUG_LOG_LIMIT {
        return pretty;
    }
    let head: String = pretty.chars().take(DEBUG_LOG_KEEP).collect();
    let tail: String = pretty.chars().skip(length - DEBUG_LOG_KEEP).collect();
    format!("{head}[...truncated...]{tail}")
}
