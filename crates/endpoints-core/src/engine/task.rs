//! Task execution.
//!
//! A task sees the resolved parameters plus the intermediate values it
//! declared as inputs, and writes each of its outputs exactly once.

use std::collections::BTreeMap;

use endpoints_types::endpoint::{HttpRequestTask, TaskDefinition, TaskKind};
use serde_json::Value;

use crate::capability::{HttpClient, HttpRequest};
use crate::error::EngineError;
use crate::execution::IntermediateValues;

use super::pattern::substitute;

/// Parameters overlaid with the named intermediate values.
pub fn visible_values(
    parameters: &BTreeMap<String, String>,
    values: &IntermediateValues,
    inputs: &[String],
) -> Result<BTreeMap<String, String>, EngineError> {
    let mut visible = parameters.clone();
    visible.extend(values.visible(inputs)?);
    Ok(visible)
}

pub async fn run_task(
    task: &TaskDefinition,
    parameters: &BTreeMap<String, String>,
    values: &IntermediateValues,
    http: &dyn HttpClient,
) -> Result<(), EngineError> {
    let visible = visible_values(parameters, values, &task.input_intermediate_values)?;

    match &task.kind {
        TaskKind::IntermediateValue { output, pattern } => {
            values.set(output, substitute(pattern, &visible)?)
        }
        TaskKind::HttpRequest(http_task) => {
            run_http_request(&task.name, http_task, &visible, values, http).await
        }
    }
}

async fn run_http_request(
    task_name: &str,
    task: &HttpRequestTask,
    visible: &BTreeMap<String, String>,
    values: &IntermediateValues,
    http: &dyn HttpClient,
) -> Result<(), EngineError> {
    let url = substitute(&task.url, visible)?;
    let headers = task
        .headers
        .iter()
        .map(|(name, pattern)| Ok((name.clone(), substitute(pattern, visible)?)))
        .collect::<Result<Vec<_>, EngineError>>()?;
    let body = task
        .body
        .as_deref()
        .map(|pattern| substitute(pattern, visible))
        .transpose()?;

    let request = HttpRequest {
        method: task.method.to_ascii_uppercase(),
        url: url.clone(),
        headers,
        body,
    };

    tracing::debug!(task = task_name, method = %request.method, url = %request.url, "sending HTTP request");
    let response = http.send(request).await?;

    if !response.is_success() {
        return Err(EngineError::HttpRequestFailed {
            url,
            status: Some(response.status),
            message: format!("server responded with status {}", response.status),
        });
    }

    if task.outputs.is_empty() {
        return Ok(());
    }

    let document: Value = serde_json::from_str(&response.body).map_err(|e| EngineError::HttpRequestFailed {
        url: url.clone(),
        status: Some(response.status),
        message: format!("response is not valid JSON: {e}"),
    })?;

    for (output, pointer) in &task.outputs {
        let value = document.pointer(pointer).ok_or_else(|| EngineError::TaskFailed {
            task: task_name.to_string(),
            message: format!("response from '{url}' has nothing at '{pointer}'"),
        })?;
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        values.set(output, value)?;
    }
    Ok(())
}
