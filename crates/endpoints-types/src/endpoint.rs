//! Endpoint declarations: parameters, tasks, responses, transformations.
//!
//! These are the post-parse configuration tree the engine executes. Every
//! polymorphic declaration (task kind, response kind, data-source command) is
//! a closed, internally tagged enum so new variants are compile-time checked.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::request_log::CounterKind;

/// Default separator used to join multiple values of one request parameter.
pub const DEFAULT_MULTIPLE_VALUE_SEPARATOR: &str = ",";

fn default_separator() -> String {
    DEFAULT_MULTIPLE_VALUE_SEPARATOR.to_string()
}

/// Declaration of one endpoint parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Used when the request (or transformation) supplies no value.
    /// A parameter without a default is mandatory.
    #[serde(default, rename = "default")]
    pub default_value: Option<String>,
}

/// A configured unit of request handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    /// After flattening: the aggregate of this endpoint's and its ancestors' declarations.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDefinition>,
    #[serde(default = "default_separator")]
    pub parameter_multiple_value_separator: String,
    /// Parameters participating in the request hash. `None` means all of them.
    #[serde(default)]
    pub parameters_for_hash: Option<Vec<String>>,
    #[serde(default)]
    pub parameter_transformation: Option<ParameterTransformation>,
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
    pub success: ResponseDefinition,
    pub error: ResponseDefinition,
}

impl Endpoint {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(hashed) = &self.parameters_for_hash {
            if let Some(unknown) = hashed.iter().find(|p| !self.parameters.contains_key(*p)) {
                return Err(ConfigError::InvalidEndpoint {
                    endpoint: self.name.clone(),
                    message: format!("hash parameter '{unknown}' is not declared"),
                });
            }
        }

        let mut task_names = HashSet::new();
        for task in &self.tasks {
            if !task_names.insert(task.name.as_str()) {
                return Err(ConfigError::InvalidEndpoint {
                    endpoint: self.name.clone(),
                    message: format!("task '{}' is declared more than once", task.name),
                });
            }
        }
        Ok(())
    }
}

/// A folder in the endpoint hierarchy. Parameters declared on a folder are
/// inherited by every endpoint below it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointFolder {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDefinition>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub folders: Vec<EndpointFolder>,
}

impl EndpointFolder {
    /// Flatten the tree into a list of endpoints with aggregated parameters.
    pub fn flatten(&self) -> Result<Vec<Endpoint>, ConfigError> {
        let mut endpoints = Vec::new();
        self.collect(&BTreeMap::new(), &mut endpoints)?;

        let mut seen = HashSet::new();
        for endpoint in &endpoints {
            if !seen.insert(endpoint.name.as_str()) {
                return Err(ConfigError::DuplicateEndpoint(endpoint.name.clone()));
            }
        }
        Ok(endpoints)
    }

    fn collect(
        &self,
        inherited: &BTreeMap<String, ParameterDefinition>,
        out: &mut Vec<Endpoint>,
    ) -> Result<(), ConfigError> {
        let mut parameters = inherited.clone();
        parameters.extend(self.parameters.clone());

        for endpoint in &self.endpoints {
            let mut endpoint = endpoint.clone();
            let mut aggregated = parameters.clone();
            aggregated.extend(std::mem::take(&mut endpoint.parameters));
            endpoint.parameters = aggregated;
            endpoint.validate()?;
            out.push(endpoint);
        }

        for folder in &self.folders {
            folder.collect(&parameters, out)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parameter transformation
// ---------------------------------------------------------------------------

/// Scripted derivation of the parameter set from the raw request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterTransformation {
    /// Opaque to the engine; interpreted by the configured transformer.
    pub script: String,
    /// Evaluated before the script; results are appended to its input document.
    #[serde(default)]
    pub data_sources: Vec<DataSourceCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DataSourceCommand {
    /// The next value of an on-demand counter.
    OnDemandCounter { counter: CounterKind },
    /// The application's audit rows.
    RequestLog,
    /// The application's own definition: name, timezone and every endpoint.
    ApplicationIntrospection,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    /// Intermediate values that must be produced before this task may run.
    #[serde(default)]
    pub input_intermediate_values: Vec<String>,
    #[serde(flatten)]
    pub kind: TaskKind,
}

impl TaskDefinition {
    /// Names of the intermediate values this task produces.
    pub fn output_intermediate_values(&self) -> Vec<String> {
        match &self.kind {
            TaskKind::HttpRequest(http) => http.outputs.keys().cloned().collect(),
            TaskKind::IntermediateValue { output, .. } => vec![output.clone()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TaskKind {
    HttpRequest(HttpRequestTask),
    /// Produces one intermediate value from a `${...}` pattern.
    IntermediateValue { output: String, pattern: String },
}

/// Outbound HTTP request. URL, header values and body are `${...}` patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequestTask {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Intermediate value name -> JSON pointer into the response body.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".to_string()
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseDefinition {
    /// Intermediate values visible to (and awaited by) the response.
    #[serde(default)]
    pub input_intermediate_values: Vec<String>,
    #[serde(flatten)]
    pub kind: ResponseKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ResponseKind {
    Empty,
    Redirect {
        url_pattern: String,
        #[serde(default)]
        whitelist: Vec<String>,
    },
    RenderedDocument {
        template: String,
        #[serde(default)]
        download_filename_pattern: Option<String>,
    },
    ForwardToEndpoint {
        endpoint: String,
        #[serde(default)]
        input_parameter_patterns: BTreeMap<String, String>,
    },
}
