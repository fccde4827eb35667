//! Scheduling of one endpoint's work within an attempt.
//!
//! An `AttemptScope` holds what every work unit of an attempt shares: the
//! transaction, the lazy counters, the allocated ids and the collaborators.
//! `schedule_endpoint` submits the parameter-resolution unit (preceded by the
//! transformation's data sources); once parameters are known that unit submits
//! the task graph and the success response to the same executor.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use endpoints_types::application::{Application, ApplicationConfig, Environment};
use endpoints_types::config::DeploymentConfig;
use endpoints_types::endpoint::{DataSourceCommand, Endpoint, ResponseDefinition, ResponseKind};
use endpoints_types::request_log::RandomRequestId;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::allocation::{OnDemandCounters, RandomIdSource};
use crate::auth::{RequestAuthenticator, hash_parameters};
use crate::capability::{DocumentGenerator, HttpClient, ParameterTransformer};
use crate::error::{EngineError, SchedulingError};
use crate::execution::scheduler::schedule_graph;
use crate::execution::{IntermediateValues, SyncPoint, TaskExecutor};
use crate::repository::AttemptTransaction;

use super::parameters::{request_parameters, validate_parameters};
use super::pattern::substitute;
use super::request::{BufferedResponse, ContentKind, ExecutionRequest};
use super::response;
use super::task::{run_task, visible_values};
use super::transformation::{
    ApplicationInput, RequestPayload, application_source, counter_source, document_for_log,
    input_document, parse_output, request_log_source,
};

/// Configuration and collaborators shared by every attempt of an engine.
pub(crate) struct EngineShared {
    pub config: DeploymentConfig,
    pub authenticator: RequestAuthenticator,
    pub transformer: Arc<dyn ParameterTransformer>,
    pub documents: Arc<dyn DocumentGenerator>,
    pub http: Arc<dyn HttpClient>,
    pub random_ids: Arc<dyn RandomIdSource>,
}

/// Ids allocated at the start of a success attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Allocations {
    pub incremental_id: i64,
    pub random_id: RandomRequestId,
}

/// Transformation documents kept for the audit row.
#[derive(Debug, Clone, Default)]
pub(crate) struct DebugPayload {
    pub input: Option<Value>,
    pub output: Option<Value>,
}

/// Receives the response of the attempt's terminal unit.
#[derive(Clone, Default)]
pub(crate) struct ResponseSlot(Arc<OnceLock<BufferedResponse>>);

impl ResponseSlot {
    fn set(&self, response: BufferedResponse) -> Result<(), EngineError> {
        self.0
            .set(response)
            .map_err(|_| EngineError::Internal("response produced twice".to_string()))
    }

    pub fn take(&self) -> Result<BufferedResponse, EngineError> {
        self.0
            .get()
            .cloned()
            .ok_or_else(|| EngineError::Internal("no response was produced".to_string()))
    }
}

pub(crate) struct AttemptScope<X> {
    pub engine: Arc<EngineShared>,
    pub environment: Environment,
    pub application: Arc<Application>,
    pub app_config: ApplicationConfig,
    pub tx: Arc<X>,
    pub counters: Arc<OnDemandCounters<X>>,
    /// `None` on the error path, which neither transforms nor forwards.
    pub allocations: Option<Allocations>,
    pub capture_debug: bool,
    pub debug: Arc<Mutex<DebugPayload>>,
    /// Forward-to-endpoint nesting level; 0 for the request itself.
    pub depth: usize,
}

impl<X: AttemptTransaction> AttemptScope<X> {
    fn nested(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            environment: self.environment,
            application: self.application.clone(),
            app_config: self.app_config.clone(),
            tx: self.tx.clone(),
            counters: self.counters.clone(),
            allocations: self.allocations,
            capture_debug: false,
            debug: Arc::new(Mutex::new(DebugPayload::default())),
            depth: self.depth + 1,
        }
    }

    fn application_input(&self) -> Result<ApplicationInput, EngineError> {
        let allocations = self.allocations.ok_or_else(|| {
            EngineError::Internal("parameter transformation outside a success attempt".to_string())
        })?;
        Ok(ApplicationInput {
            application: self.application.name.clone(),
            display_name: self
                .app_config
                .display_name
                .clone()
                .or_else(|| self.application.display_name.clone()),
            debug_allowed: self.app_config.debug_allowed,
            secret_key: self.application.current_secret_key().map(str::to_string),
            incremental_id_per_endpoint: allocations.incremental_id,
            random_id_per_application: allocations.random_id,
        })
    }
}

/// Submit the parameter resolution of `endpoint` for `request`.
///
/// Content-type problems are reported here, before anything is submitted.
pub(crate) fn schedule_endpoint<X: AttemptTransaction>(
    scope: &Arc<AttemptScope<X>>,
    executor: &TaskExecutor,
    endpoint: Arc<Endpoint>,
    request: ExecutionRequest,
    hash: Option<String>,
    debug_requested: bool,
    slot: ResponseSlot,
) -> Result<(), EngineError> {
    let content = request.content_kind()?;

    let Some(transformation) = endpoint.parameter_transformation.clone() else {
        if content == ContentKind::Json {
            return Err(EngineError::request_invalid(format!(
                "Endpoint '{}' has no parameter transformation, therefore cannot accept a JSON request",
                endpoint.name
            )));
        }
        let supplied = request_parameters(&endpoint, &request);
        let (scope, next) = (scope.clone(), executor.clone());
        executor.schedule("parameters", vec![], async move {
            continue_with_parameters(&scope, &next, endpoint, &supplied, hash, slot)
        });
        return Ok(());
    };

    let payload = match content {
        ContentKind::Form => RequestPayload::Parameters(request_parameters(&endpoint, &request)),
        ContentKind::Json => {
            let body = request.body.as_deref().unwrap_or_default();
            let document = serde_json::from_slice(body).map_err(|e| {
                EngineError::request_invalid(format!("Request is not valid JSON: {e}"))
            })?;
            RequestPayload::Body(document)
        }
    };

    let mut source_points: Vec<SyncPoint> = Vec::new();
    let mut source_results: Vec<Arc<OnceLock<Value>>> = Vec::new();
    for (idx, command) in transformation.data_sources.iter().cloned().enumerate() {
        let result = Arc::new(OnceLock::new());
        let (scope, out) = (scope.clone(), result.clone());
        let point = executor.schedule(format!("data-source-{idx}"), vec![], async move {
            let value = match command {
                DataSourceCommand::OnDemandCounter { counter } => {
                    counter_source(counter, scope.counters.get_or_fetch(counter).await?)
                }
                DataSourceCommand::RequestLog => {
                    let rows = scope.tx.list_request_log(&scope.application.name).await?;
                    request_log_source(&rows)?
                }
                DataSourceCommand::ApplicationIntrospection => application_source(&scope.application)?,
            };
            out.set(value)
                .map_err(|_| EngineError::Internal("data source evaluated twice".to_string()))
        });
        source_points.push(point);
        source_results.push(result);
    }

    let (scope, next) = (scope.clone(), executor.clone());
    executor.schedule("parameter-transformation", source_points, async move {
        let data_sources = source_results
            .iter()
            .map(|r| {
                r.get()
                    .cloned()
                    .ok_or_else(|| EngineError::Internal("data source produced no result".to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let input = input_document(
            &payload,
            debug_requested,
            request.user_agent.as_deref(),
            request.ip_address.as_deref(),
            &scope.application_input()?,
            data_sources,
        );
        if scope.engine.config.transformation_debug_log {
            tracing::info!(endpoint = %endpoint.name, document = %document_for_log(&input), "transformation input");
        }
        if scope.capture_debug {
            scope.debug.lock().await.input = Some(input.clone());
        }

        let output = scope
            .engine
            .transformer
            .transform(&transformation.script, input)
            .await?;

        if scope.engine.config.transformation_debug_log {
            tracing::info!(endpoint = %endpoint.name, document = %document_for_log(&output), "transformation output");
        }
        if scope.capture_debug {
            scope.debug.lock().await.output = Some(output.clone());
        }

        let supplied = parse_output(&endpoint, &output)?;
        continue_with_parameters(&scope, &next, endpoint, &supplied, hash, slot)
    });

    Ok(())
}

/// Validate parameters, check the hash, then submit tasks and the success response.
fn continue_with_parameters<X: AttemptTransaction>(
    scope: &Arc<AttemptScope<X>>,
    executor: &TaskExecutor,
    endpoint: Arc<Endpoint>,
    supplied: &BTreeMap<String, String>,
    hash: Option<String>,
    slot: ResponseSlot,
) -> Result<(), EngineError> {
    let parameters = Arc::new(validate_parameters(&endpoint, supplied)?);

    if let Some(hash) = hash {
        scope.engine.authenticator.verify(
            &hash,
            &scope.application,
            scope.environment,
            &endpoint.name,
            &hash_parameters(&endpoint, &parameters),
        )?;
    }

    let values = IntermediateValues::new();
    let terminal = {
        let (scope, endpoint, parameters, values) =
            (scope.clone(), endpoint.clone(), parameters.clone(), values.clone());
        async move {
            let response = produce_response(&scope, &endpoint.success, &parameters, &values, true).await?;
            slot.set(response)
        }
    };

    schedule_graph(
        executor,
        &endpoint.tasks,
        "success-response",
        &endpoint.success.input_intermediate_values,
        |task| {
            let task = task.clone();
            let (parameters, values, http) = (parameters.clone(), values.clone(), scope.engine.http.clone());
            async move { run_task(&task, &parameters, &values, http.as_ref()).await }
        },
        terminal,
    )?;
    Ok(())
}

/// Submit a response unit with no predecessors (the error path).
pub(crate) fn schedule_response<X: AttemptTransaction>(
    scope: &Arc<AttemptScope<X>>,
    executor: &TaskExecutor,
    definition: ResponseDefinition,
    success: bool,
    slot: ResponseSlot,
) {
    let scope = scope.clone();
    let name = if success { "success-response" } else { "error-response" };
    executor.schedule(name, vec![], async move {
        let response = produce_response(
            &scope,
            &definition,
            &BTreeMap::new(),
            &IntermediateValues::new(),
            success,
        )
        .await?;
        slot.set(response)
    });
}

async fn produce_response<X: AttemptTransaction>(
    scope: &Arc<AttemptScope<X>>,
    definition: &ResponseDefinition,
    parameters: &BTreeMap<String, String>,
    values: &IntermediateValues,
    success: bool,
) -> Result<BufferedResponse, EngineError> {
    let visible = visible_values(parameters, values, &definition.input_intermediate_values)?;

    match &definition.kind {
        ResponseKind::Empty => Ok(response::empty(success)),
        ResponseKind::Redirect { url_pattern, whitelist } => {
            response::redirect(url_pattern, whitelist, &visible)
        }
        ResponseKind::RenderedDocument {
            template,
            download_filename_pattern,
        } => {
            response::rendered_document(
                scope.engine.documents.as_ref(),
                template,
                download_filename_pattern.as_deref(),
                &visible,
                success,
            )
            .await
        }
        ResponseKind::ForwardToEndpoint {
            endpoint,
            input_parameter_patterns,
        } => forward(scope, endpoint, input_parameter_patterns, &visible).await,
    }
}

/// Run `target` to completion on a nested executor, sharing this attempt's
/// transaction, counters and ids, without a hash check.
async fn forward<X: AttemptTransaction>(
    scope: &Arc<AttemptScope<X>>,
    target: &str,
    patterns: &BTreeMap<String, String>,
    visible: &BTreeMap<String, String>,
) -> Result<BufferedResponse, EngineError> {
    let max = scope.engine.config.max_forward_depth;
    if scope.depth >= max {
        return Err(SchedulingError::ForwardDepthExceeded { max }.into());
    }
    if scope.allocations.is_none() {
        return Err(EngineError::Configuration(
            "an error response cannot forward to another endpoint".to_string(),
        ));
    }

    let endpoint = scope
        .application
        .find_endpoint(target)
        .cloned()
        .map(Arc::new)
        .ok_or_else(|| EngineError::Configuration(format!("forward target '{target}' not found")))?;

    let parameters = patterns
        .iter()
        .map(|(name, pattern)| Ok((name.clone(), substitute(pattern, visible)?)))
        .collect::<Result<BTreeMap<_, _>, EngineError>>()?;

    tracing::debug!(forward_target = target, depth = scope.depth + 1, "forwarding to endpoint");

    let nested = Arc::new(scope.nested());
    let executor = TaskExecutor::new(
        format!("{}/forward:{target}", scope.application.name),
        scope.engine.config.effective_pool_size(),
    );
    let slot = ResponseSlot::default();

    let scheduled = schedule_endpoint(
        &nested,
        &executor,
        endpoint,
        ExecutionRequest::forwarded(parameters),
        None,
        false,
        slot.clone(),
    );
    let ran = executor.run().await;
    scheduled?;
    ran?;
    slot.take()
}
