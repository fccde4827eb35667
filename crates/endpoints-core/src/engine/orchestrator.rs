//! Request lifecycle: success attempt, error attempt, audit rows.
//!
//! Each request runs in its own transaction under the per-(application,
//! environment) lock. When the success attempt fails, its transaction is
//! rolled back and the endpoint's error response runs in a second transaction
//! (the "error attempt"), so exactly one audit row is written per request.
//! Scheduling defects bypass the error response: the caller gets
//! `ExecutionFailure::Fatal` and a best-effort 500 row is recorded.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use endpoints_types::application::{Application, Environment};
use endpoints_types::config::DeploymentConfig;
use endpoints_types::endpoint::Endpoint;
use endpoints_types::request_log::{CounterKind, RequestLogRecord};
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::allocation::{OnDemandCounters, RandomIdSource, ThreadRngSource, allocate_random_id};
use crate::auth::{RequestAuthenticator, RequestHasher};
use crate::capability::{DocumentGenerator, HttpClient, ParameterTransformer};
use crate::error::{EngineError, ExecutionFailure};
use crate::execution::TaskExecutor;
use crate::repository::{AttemptTransaction, RequestStore};

use super::attempt::{
    Allocations, AttemptScope, DebugPayload, EngineShared, ResponseSlot, schedule_endpoint,
    schedule_response,
};
use super::request::{BufferedResponse, ExecutionRequest};

/// Implementations the engine delegates to.
pub struct Collaborators {
    pub hasher: Arc<dyn RequestHasher>,
    pub transformer: Arc<dyn ParameterTransformer>,
    pub documents: Arc<dyn DocumentGenerator>,
    pub http: Arc<dyn HttpClient>,
    pub random_ids: Arc<dyn RandomIdSource>,
}

impl Collaborators {
    /// Collaborators drawing random ids from the thread RNG.
    pub fn new(
        hasher: Arc<dyn RequestHasher>,
        transformer: Arc<dyn ParameterTransformer>,
        documents: Arc<dyn DocumentGenerator>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            hasher,
            transformer,
            documents,
            http,
            random_ids: Arc::new(ThreadRngSource),
        }
    }
}

/// What the success attempt leaves behind for the error attempt.
#[derive(Debug, Default)]
struct AttemptTrace {
    counters: Vec<CounterKind>,
    debug: DebugPayload,
}

struct RequestMeta {
    user_agent: Option<String>,
    ip_address: Option<String>,
    started: DateTime<Utc>,
    clock: Instant,
}

impl RequestMeta {
    fn record(
        &self,
        application: &Application,
        environment: Environment,
        endpoint: &Endpoint,
        status_code: u16,
    ) -> RequestLogRecord {
        let mut record = RequestLogRecord::new(&application.name, environment, &endpoint.name, self.started);
        record.duration_ms = i64::try_from(self.clock.elapsed().as_millis()).unwrap_or(i64::MAX);
        record.status_code = status_code;
        record.user_agent = self.user_agent.clone();
        record.ip_address = self.ip_address.clone();
        record
    }
}

fn describe_failure(record: &mut RequestLogRecord, error: &EngineError) {
    record.failure_kind = Some(error.kind());
    record.exception_message = Some(error.to_string());
    match error {
        EngineError::HttpRequestFailed { url, status, .. } => {
            record.http_request_failed_url = Some(url.clone());
            record.http_request_failed_status_code = *status;
        }
        EngineError::TransformationReportedError { error } => {
            record.transformation_error_message = Some(error.clone());
        }
        _ => {}
    }
}

async fn rollback_quietly<X: AttemptTransaction>(tx: &X) {
    if let Err(e) = tx.rollback().await {
        tracing::debug!(error = %e, "rollback after failed attempt");
    }
}

pub struct EndpointEngine<S> {
    store: S,
    shared: Arc<EngineShared>,
}

impl<S: RequestStore> EndpointEngine<S> {
    pub fn new(store: S, config: DeploymentConfig, collaborators: Collaborators) -> Self {
        let authenticator = RequestAuthenticator::new(
            collaborators.hasher,
            config.check_hash,
            config.display_expected_hash,
        );
        Self {
            store,
            shared: Arc::new(EngineShared {
                config,
                authenticator,
                transformer: collaborators.transformer,
                documents: collaborators.documents,
                http: collaborators.http,
                random_ids: collaborators.random_ids,
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.shared.config
    }

    pub fn authenticator(&self) -> &RequestAuthenticator {
        &self.shared.authenticator
    }

    /// Execute `endpoint` of `application` for one request.
    ///
    /// Returns the success response, or the endpoint's error response when
    /// the success attempt failed. `Err` means no endpoint-defined response
    /// could be produced and the caller should answer with a 500.
    pub async fn execute(
        &self,
        environment: Environment,
        application: Arc<Application>,
        endpoint: &str,
        debug_requested: bool,
        hash: Option<&str>,
        request: ExecutionRequest,
    ) -> Result<BufferedResponse, ExecutionFailure> {
        let meta = RequestMeta {
            user_agent: request.user_agent.clone(),
            ip_address: request.ip_address.clone(),
            started: Utc::now(),
            clock: Instant::now(),
        };

        let Some(endpoint) = application.find_endpoint(endpoint).cloned().map(Arc::new) else {
            return Err(ExecutionFailure::Fatal(Box::new(EngineError::Configuration(format!(
                "endpoint '{endpoint}' not found in application '{}'",
                application.name
            )))));
        };

        let mut trace = AttemptTrace::default();
        let span = tracing::info_span!(
            "endpoint_attempt",
            application = %application.name,
            %environment,
            endpoint = %endpoint.name
        );
        let outcome = self
            .attempt_success(
                environment,
                &application,
                &endpoint,
                debug_requested,
                hash.map(str::to_string),
                request,
                &meta,
                &mut trace,
            )
            .instrument(span)
            .await;

        let error = match outcome {
            Ok(response) => {
                tracing::info!(
                    application = %application.name,
                    endpoint = %endpoint.name,
                    status = response.status_code,
                    duration_ms = meta.clock.elapsed().as_millis() as u64,
                    "request executed"
                );
                return Ok(response);
            }
            Err(error) => error,
        };

        if error.is_fatal() {
            tracing::error!(
                application = %application.name,
                endpoint = %endpoint.name,
                error = %error,
                "endpoint cannot be executed"
            );
            self.record_fatal(environment, &application, &endpoint, &error, &meta)
                .await;
            return Err(ExecutionFailure::Fatal(Box::new(error)));
        }

        tracing::warn!(
            application = %application.name,
            endpoint = %endpoint.name,
            kind = %error.kind(),
            error = %error,
            "request failed, delivering error response"
        );

        let span = tracing::info_span!(
            "endpoint_error_attempt",
            application = %application.name,
            %environment,
            endpoint = %endpoint.name
        );
        match self
            .attempt_error(environment, &application, &endpoint, &error, &meta, &trace)
            .instrument(span)
            .await
        {
            Ok(response) => Ok(response),
            Err(secondary) => {
                tracing::error!(
                    application = %application.name,
                    endpoint = %endpoint.name,
                    original = %error,
                    error = %secondary,
                    "error response failed"
                );
                Err(ExecutionFailure::ErrorResponseFailed {
                    original: Box::new(error),
                    secondary: Box::new(secondary),
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt_success(
        &self,
        environment: Environment,
        application: &Arc<Application>,
        endpoint: &Arc<Endpoint>,
        debug_requested: bool,
        hash: Option<String>,
        request: ExecutionRequest,
        meta: &RequestMeta,
        trace: &mut AttemptTrace,
    ) -> Result<BufferedResponse, EngineError> {
        let tx = Arc::new(self.store.begin().await?);

        let app_config = tx.fetch_application_config(&application.name).await?;
        if app_config.locked {
            rollback_quietly(tx.as_ref()).await;
            return Err(EngineError::request_invalid("Application is locked"));
        }

        let result: Result<BufferedResponse, EngineError> = async {
            tx.lock_application(&application.name, environment).await?;

            let incremental_id = tx
                .max_incremental_id(&application.name, environment, &endpoint.name)
                .await?
                .map_or(1, |max| max + 1);
            let counters = Arc::new(OnDemandCounters::new(
                tx.clone(),
                application.name.clone(),
                environment,
                application.timezone,
                meta.started,
            ));
            let random_id = allocate_random_id(
                tx.as_ref(),
                self.shared.random_ids.as_ref(),
                &application.name,
                environment,
            )
            .await?;

            let scope = Arc::new(AttemptScope {
                engine: self.shared.clone(),
                environment,
                application: application.clone(),
                capture_debug: app_config.debug_allowed && debug_requested,
                app_config,
                tx: tx.clone(),
                counters: counters.clone(),
                allocations: Some(Allocations {
                    incremental_id,
                    random_id,
                }),
                debug: Arc::new(Mutex::new(DebugPayload::default())),
                depth: 0,
            });

            let executor = TaskExecutor::new(
                format!("{}/{}", application.name, endpoint.name),
                self.shared.config.effective_pool_size(),
            );
            let slot = ResponseSlot::default();
            let scheduled = schedule_endpoint(
                &scope,
                &executor,
                endpoint.clone(),
                request,
                hash,
                debug_requested,
                slot.clone(),
            );
            let ran = executor.run().await;

            trace.counters = counters.fetched().into_iter().map(|(kind, _)| kind).collect();
            trace.debug = scope.debug.lock().await.clone();
            scheduled?;
            ran?;
            let response = slot.take()?;

            let mut record = meta.record(application, environment, endpoint, response.status_code);
            record.incremental_id_per_endpoint = Some(incremental_id);
            record.random_id_per_application = Some(random_id);
            counters.record_into(&mut record);
            record.transformation_input = trace.debug.input.clone();
            record.transformation_output = trace.debug.output.clone();

            tx.insert_request_log(&record).await?;
            tx.commit().await?;
            Ok(response)
        }
        .await;

        if result.is_err() {
            rollback_quietly(tx.as_ref()).await;
        }
        result
    }

    /// Produce the endpoint's error response in a fresh transaction.
    ///
    /// Counters the failed attempt fetched are fetched again so the audit row
    /// still consumes them; incremental and random ids are not allocated.
    async fn attempt_error(
        &self,
        environment: Environment,
        application: &Arc<Application>,
        endpoint: &Arc<Endpoint>,
        original: &EngineError,
        meta: &RequestMeta,
        trace: &AttemptTrace,
    ) -> Result<BufferedResponse, EngineError> {
        let tx = Arc::new(self.store.begin().await?);

        let result: Result<BufferedResponse, EngineError> = async {
            let app_config = tx.fetch_application_config(&application.name).await?;
            tx.lock_application(&application.name, environment).await?;

            let counters = Arc::new(OnDemandCounters::new(
                tx.clone(),
                application.name.clone(),
                environment,
                application.timezone,
                meta.started,
            ));
            for kind in &trace.counters {
                counters.get_or_fetch(*kind).await?;
            }

            let scope = Arc::new(AttemptScope {
                engine: self.shared.clone(),
                environment,
                application: application.clone(),
                app_config,
                tx: tx.clone(),
                counters: counters.clone(),
                allocations: None,
                capture_debug: false,
                debug: Arc::new(Mutex::new(DebugPayload::default())),
                depth: 0,
            });

            let executor = TaskExecutor::new(
                format!("{}/{}:error", application.name, endpoint.name),
                self.shared.config.effective_pool_size(),
            );
            let slot = ResponseSlot::default();
            schedule_response(&scope, &executor, endpoint.error.clone(), false, slot.clone());
            executor.run().await?;
            let response = slot.take()?;

            let mut record = meta.record(application, environment, endpoint, response.status_code);
            counters.record_into(&mut record);
            describe_failure(&mut record, original);
            record.transformation_input = trace.debug.input.clone();
            record.transformation_output = trace.debug.output.clone();

            tx.insert_request_log(&record).await?;
            tx.commit().await?;
            Ok(response)
        }
        .await;

        if result.is_err() {
            rollback_quietly(tx.as_ref()).await;
        }
        result
    }

    /// Best-effort 500 row for a request that could not be executed at all.
    async fn record_fatal(
        &self,
        environment: Environment,
        application: &Application,
        endpoint: &Endpoint,
        error: &EngineError,
        meta: &RequestMeta,
    ) {
        let outcome = async {
            let tx = self.store.begin().await?;
            tx.lock_application(&application.name, environment).await?;
            let mut record = meta.record(application, environment, endpoint, 500);
            describe_failure(&mut record, error);
            tx.insert_request_log(&record).await?;
            tx.commit().await
        }
        .await;

        if let Err(e) = outcome {
            tracing::warn!(error = %e, "failed to record fatal request");
        }
    }
}
