//! Request store trait definition.
//!
//! An attempt runs entirely inside one `AttemptTransaction`. Implementations
//! must serialise concurrent use of the transaction by work units running in
//! parallel, and `lock_application` must block other transactions from
//! allocating counters or random ids for the same application/environment
//! until this transaction finishes.

use chrono::{DateTime, Utc};
use endpoints_types::application::{ApplicationConfig, Environment};
use endpoints_types::error::RepositoryError;
use endpoints_types::request_log::{CounterKind, RandomRequestId, RequestLogRecord};

/// Half-open `[start, end)` interval on `datetime_utc`. `None` means unbounded.
pub type CounterWindow = Option<(DateTime<Utc>, DateTime<Utc>)>;

/// Factory for attempt transactions, plus read access outside any attempt.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait RequestStore: Send + Sync {
    type Transaction: AttemptTransaction;

    /// Open a new, independent transaction.
    fn begin(
        &self,
    ) -> impl std::future::Future<Output = Result<Self::Transaction, RepositoryError>> + Send;

    /// Most recent audit rows, newest first, optionally for one application.
    fn recent_requests(
        &self,
        application: Option<&str>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<RequestLogRecord>, RepositoryError>> + Send;
}

/// One open transaction. All methods take `&self` so the transaction can be
/// shared by concurrently running work units behind an `Arc`.
pub trait AttemptTransaction: Send + Sync + 'static {
    /// Stored settings for an application; defaults when no row exists.
    fn fetch_application_config(
        &self,
        application: &str,
    ) -> impl std::future::Future<Output = Result<ApplicationConfig, RepositoryError>> + Send;

    /// Take the exclusive per-(application, environment) lock for the rest
    /// of this transaction.
    fn lock_application(
        &self,
        application: &str,
        environment: Environment,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Highest incremental id logged for the endpoint, if any.
    fn max_incremental_id(
        &self,
        application: &str,
        environment: Environment,
        endpoint: &str,
    ) -> impl std::future::Future<Output = Result<Option<i64>, RepositoryError>> + Send;

    /// Highest counter value logged for `kind` among rows within `window`.
    fn max_counter_value(
        &self,
        application: &str,
        environment: Environment,
        kind: CounterKind,
        window: CounterWindow,
    ) -> impl std::future::Future<Output = Result<Option<i64>, RepositoryError>> + Send;

    fn random_id_exists(
        &self,
        application: &str,
        environment: Environment,
        id: RandomRequestId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    fn insert_request_log(
        &self,
        record: &RequestLogRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Audit rows of an application (all environments), oldest first.
    fn list_request_log(
        &self,
        application: &str,
    ) -> impl std::future::Future<Output = Result<Vec<RequestLogRecord>, RepositoryError>> + Send;

    fn commit(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Discard all changes. Dropping an unfinished transaction has the same effect.
    fn rollback(&self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
