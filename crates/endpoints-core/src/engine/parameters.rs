//! Parameter resolution from the raw request and validation against the
//! endpoint's declarations.

use std::collections::BTreeMap;

use endpoints_types::endpoint::Endpoint;

use crate::error::EngineError;

use super::request::ExecutionRequest;

/// Request parameters with multiple values joined by the endpoint's separator.
pub fn request_parameters(endpoint: &Endpoint, request: &ExecutionRequest) -> BTreeMap<String, String> {
    request
        .parameters
        .iter()
        .map(|(name, values)| {
            (
                name.clone(),
                values.join(&endpoint.parameter_multiple_value_separator),
            )
        })
        .collect()
}

/// Every declared parameter with its supplied value or default.
///
/// Undeclared supplied parameters are dropped. A declared parameter with
/// neither value nor default is a client error.
pub fn validate_parameters(
    endpoint: &Endpoint,
    supplied: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, EngineError> {
    let mut checked = BTreeMap::new();
    for (name, definition) in &endpoint.parameters {
        let value = supplied
            .get(name)
            .or(definition.default_value.as_ref())
            .ok_or_else(|| {
                EngineError::request_invalid(format!(
                    "Endpoint '{}': parameter '{name}' did not have a supplied value, nor a default",
                    endpoint.name
                ))
            })?;
        checked.insert(name.clone(), value.clone());
    }
    Ok(checked)
}
