//! In-memory store and collaborator fakes for engine tests.
//!
//! `lock_application` takes one store-wide lock held until commit or
//! rollback, mirroring the SQLite write lock.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use endpoints_types::application::{ApplicationConfig, Environment};
use endpoints_types::error::RepositoryError;
use endpoints_types::request_log::{CounterKind, RandomRequestId, RequestLogRecord};
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;

use crate::allocation::RandomIdSource;
use crate::auth::RequestHasher;
use crate::capability::{DocumentGenerator, GeneratedDocument, HttpClient, HttpRequest, HttpResponse, ParameterTransformer};
use crate::error::EngineError;
use crate::repository::{AttemptTransaction, CounterWindow, RequestStore};

#[derive(Default)]
pub struct MemoryState {
    records: Mutex<Vec<RequestLogRecord>>,
    configs: Mutex<HashMap<String, ApplicationConfig>>,
    app_lock: Arc<tokio::sync::Mutex<()>>,
    request_log_unavailable: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_config(&self, application: &str, config: ApplicationConfig) {
        self.state
            .configs
            .lock()
            .unwrap()
            .insert(application.to_string(), config);
    }

    pub fn insert_committed(&self, record: RequestLogRecord) {
        self.state.records.lock().unwrap().push(record);
    }

    pub fn records(&self) -> Vec<RequestLogRecord> {
        self.state.records.lock().unwrap().clone()
    }

    /// Make every later `list_request_log` query fail.
    pub fn fail_request_log_queries(&self) {
        self.state.request_log_unavailable.store(true, Ordering::SeqCst);
    }
}

impl RequestStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, RepositoryError> {
        Ok(MemoryTransaction {
            state: self.state.clone(),
            staged: Mutex::new(Vec::new()),
            lock: tokio::sync::Mutex::new(None),
            finished: AtomicBool::new(false),
        })
    }

    async fn recent_requests(
        &self,
        application: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RequestLogRecord>, RepositoryError> {
        let mut rows: Vec<_> = self
            .records()
            .into_iter()
            .filter(|r| application.is_none_or(|a| r.application == a))
            .collect();
        rows.reverse();
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

pub struct MemoryTransaction {
    state: Arc<MemoryState>,
    staged: Mutex<Vec<RequestLogRecord>>,
    lock: tokio::sync::Mutex<Option<OwnedMutexGuard<()>>>,
    finished: AtomicBool,
}

impl MemoryTransaction {
    fn visible(&self) -> Result<Vec<RequestLogRecord>, RepositoryError> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(RepositoryError::TransactionFinished);
        }
        let mut rows = self.state.records.lock().unwrap().clone();
        rows.extend(self.staged.lock().unwrap().iter().cloned());
        Ok(rows)
    }

    async fn finish(&self) -> Result<(), RepositoryError> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return Err(RepositoryError::TransactionFinished);
        }
        self.lock.lock().await.take();
        Ok(())
    }
}

impl AttemptTransaction for MemoryTransaction {
    async fn fetch_application_config(
        &self,
        application: &str,
    ) -> Result<ApplicationConfig, RepositoryError> {
        Ok(self
            .state
            .configs
            .lock()
            .unwrap()
            .get(application)
            .cloned()
            .unwrap_or_default())
    }

    async fn lock_application(
        &self,
        _application: &str,
        _environment: Environment,
    ) -> Result<(), RepositoryError> {
        let mut held = self.lock.lock().await;
        if held.is_none() {
            *held = Some(self.state.app_lock.clone().lock_owned().await);
        }
        Ok(())
    }

    async fn max_incremental_id(
        &self,
        application: &str,
        environment: Environment,
        endpoint: &str,
    ) -> Result<Option<i64>, RepositoryError> {
        Ok(self
            .visible()?
            .iter()
            .filter(|r| r.application == application && r.environment == environment && r.endpoint == endpoint)
            .filter_map(|r| r.incremental_id_per_endpoint)
            .max())
    }

    async fn max_counter_value(
        &self,
        application: &str,
        environment: Environment,
        kind: CounterKind,
        window: CounterWindow,
    ) -> Result<Option<i64>, RepositoryError> {
        Ok(self
            .visible()?
            .iter()
            .filter(|r| r.application == application && r.environment == environment)
            .filter(|r| window.is_none_or(|(start, end)| r.datetime_utc >= start && r.datetime_utc < end))
            .filter_map(|r| r.counter(kind))
            .max())
    }

    async fn random_id_exists(
        &self,
        application: &str,
        environment: Environment,
        id: RandomRequestId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.visible()?.iter().any(|r| {
            r.application == application
                && r.environment == environment
                && r.random_id_per_application == Some(id)
        }))
    }

    async fn insert_request_log(&self, record: &RequestLogRecord) -> Result<(), RepositoryError> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(RepositoryError::TransactionFinished);
        }
        self.staged.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn list_request_log(&self, application: &str) -> Result<Vec<RequestLogRecord>, RepositoryError> {
        if self.state.request_log_unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("request_log is unavailable".to_string()));
        }
        Ok(self
            .visible()?
            .into_iter()
            .filter(|r| r.application == application)
            .collect())
    }

    async fn commit(&self) -> Result<(), RepositoryError> {
        let staged = std::mem::take(&mut *self.staged.lock().unwrap());
        self.state.records.lock().unwrap().extend(staged);
        self.finish().await
    }

    async fn rollback(&self) -> Result<(), RepositoryError> {
        self.staged.lock().unwrap().clear();
        self.finish().await
    }
}

// ---------------------------------------------------------------------------
// Collaborator fakes
// ---------------------------------------------------------------------------

/// Transformer that answers with a fixed document and remembers its input.
#[derive(Default)]
pub struct StaticTransformer {
    pub output: Value,
    pub last_input: Mutex<Option<Value>>,
}

impl StaticTransformer {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            last_input: Mutex::new(None),
        }
    }
}

impl ParameterTransformer for StaticTransformer {
    fn transform<'a>(
        &'a self,
        _script: &'a str,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, EngineError>> + Send + 'a>> {
        *self.last_input.lock().unwrap() = Some(input);
        let output = self.output.clone();
        Box::pin(async move { Ok(output) })
    }
}

/// Transformer computing its output from the input document.
pub struct FnTransformer<F>(pub F);

impl<F> ParameterTransformer for FnTransformer<F>
where
    F: Fn(&Value) -> Value + Send + Sync,
{
    fn transform<'a>(
        &'a self,
        _script: &'a str,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, EngineError>> + Send + 'a>> {
        let output = (self.0)(&input);
        Box::pin(async move { Ok(output) })
    }
}

/// Renders the template with `${name}` replaced from parameters and values.
pub struct EchoDocumentGenerator;

impl DocumentGenerator for EchoDocumentGenerator {
    fn generate<'a>(
        &'a self,
        template: &'a str,
        parameters: &'a BTreeMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<GeneratedDocument, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            let body = crate::engine::pattern::substitute(template, parameters)?;
            Ok(GeneratedDocument {
                content_type: "text/plain; charset=utf-8".to_string(),
                body: body.into_bytes(),
            })
        })
    }
}

/// HTTP client answering every request with one canned response.
pub struct CannedHttpClient {
    pub status: u16,
    pub body: String,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl CannedHttpClient {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl HttpClient for CannedHttpClient {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, EngineError>> + Send + 'a>> {
        self.requests.lock().unwrap().push(request);
        let response = HttpResponse {
            status: self.status,
            body: self.body.clone(),
        };
        Box::pin(async move { Ok(response) })
    }
}

/// Random id source that proposes the same id every time.
pub struct FixedRandomId(pub i64);

impl RandomIdSource for FixedRandomId {
    fn candidate(&self) -> i64 {
        self.0
    }
}

/// Keyed hash built on the std hasher; hex output like the real one.
pub struct StdHasher;

impl RequestHasher for StdHasher {
    fn hash(&self, secret_key: &str, text: &str) -> Result<String, EngineError> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        secret_key.hash(&mut hasher);
        text.hash(&mut hasher);
        Ok(format!("{:016x}", hasher.finish()))
    }
}
