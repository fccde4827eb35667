//! SQLite implementation of `RequestStore`.
//!
//! An attempt transaction is a sqlx transaction on the attempt connection. Work units
//! of one attempt share it behind an async mutex, so statements from parallel
//! units never interleave on the connection. `lock_application` touches the
//! `application_publish` row, which holds SQLite's write lock until the
//! transaction ends.

use chrono::{DateTime, SecondsFormat, Utc};
use endpoints_core::repository::{AttemptTransaction, CounterWindow, RequestStore};
use endpoints_types::application::{ApplicationConfig, Environment};
use endpoints_types::error::RepositoryError;
use endpoints_types::request_log::{CounterKind, FailureKind, RandomRequestId, RequestLogRecord};
use sqlx::{Row, Sqlite, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::pool::StorePools;

const REQUEST_LOG_COLUMNS: &str = "id, application, environment, endpoint, datetime_utc, duration_ms, \
     status_code, user_agent, ip_address, incremental_id_per_endpoint, random_id_per_application, \
     on_demand_perpetual, on_demand_year, on_demand_month, transformation_input, transformation_output, \
     failure_kind, exception_message, http_request_failed_url, http_request_failed_status_code, \
     transformation_error_message";

/// SQLite-backed implementation of `RequestStore`.
#[derive(Clone)]
pub struct SqliteRequestStore {
    pools: StorePools,
}

impl SqliteRequestStore {
    pub fn new(pools: StorePools) -> Self {
        Self { pools }
    }

    /// Create or replace the administrative settings of an application.
    pub async fn set_application_config(
        &self,
        application: &str,
        config: &ApplicationConfig,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO application_config (application, display_name, locked, debug_allowed)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(application) DO UPDATE SET
                 display_name = excluded.display_name,
                 locked = excluded.locked,
                 debug_allowed = excluded.debug_allowed"#,
        )
        .bind(application)
        .bind(&config.display_name)
        .bind(config.locked)
        .bind(config.debug_allowed)
        .execute(&self.pools.attempts)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }
}

impl RequestStore for SqliteRequestStore {
    type Transaction = SqliteTransaction;

    async fn begin(&self) -> Result<SqliteTransaction, RepositoryError> {
        let tx = self
            .pools
            .attempts
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(format!("begin transaction: {e}")))?;
        Ok(SqliteTransaction {
            tx: Mutex::new(Some(tx)),
        })
    }

    async fn recent_requests(
        &self,
        application: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RequestLogRecord>, RepositoryError> {
        let rows = match application {
            Some(application) => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_LOG_COLUMNS} FROM request_log WHERE application = ? \
                     ORDER BY datetime_utc DESC, id DESC LIMIT ?"
                ))
                .bind(application)
                .bind(i64::from(limit))
                .fetch_all(&self.pools.listings)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_LOG_COLUMNS} FROM request_log ORDER BY datetime_utc DESC, id DESC LIMIT ?"
                ))
                .bind(i64::from(limit))
                .fetch_all(&self.pools.listings)
                .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(record_from_row).collect()
    }
}

/// One attempt transaction; finished by `commit`, `rollback` or drop.
pub struct SqliteTransaction {
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteTransaction {
    async fn take(&self) -> Result<Transaction<'static, Sqlite>, RepositoryError> {
        self.tx
            .lock()
            .await
            .take()
            .ok_or(RepositoryError::TransactionFinished)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn format_datetime(dt: &DateTime<Utc>) -> String {
    // Fixed width, so lexical order in SQL matches time order.
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn counter_column(kind: CounterKind) -> &'static str {
    match kind {
        CounterKind::Perpetual => "on_demand_perpetual",
        CounterKind::Year => "on_demand_year",
        CounterKind::Month => "on_demand_month",
    }
}

fn json_column(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

fn parse_json(column: &str, value: Option<String>) -> Result<Option<serde_json::Value>, RepositoryError> {
    value
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| RepositoryError::Query(format!("invalid {column}: {e}")))
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<RequestLogRecord, RepositoryError> {
    RequestLogRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_record()
}

struct RequestLogRow {
    id: String,
    application: String,
    environment: String,
    endpoint: String,
    datetime_utc: String,
    duration_ms: i64,
    status_code: i64,
    user_agent: Option<String>,
    ip_address: Option<String>,
    incremental_id_per_endpoint: Option<i64>,
    random_id_per_application: Option<i64>,
    on_demand_perpetual: Option<i64>,
    on_demand_year: Option<i64>,
    on_demand_month: Option<i64>,
    transformation_input: Option<String>,
    transformation_output: Option<String>,
    failure_kind: Option<String>,
    exception_message: Option<String>,
    http_request_failed_url: Option<String>,
    http_request_failed_status_code: Option<i64>,
    transformation_error_message: Option<String>,
}

impl RequestLogRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            application: row.try_get("application")?,
            environment: row.try_get("environment")?,
            endpoint: row.try_get("endpoint")?,
            datetime_utc: row.try_get("datetime_utc")?,
            duration_ms: row.try_get("duration_ms")?,
            status_code: row.try_get("status_code")?,
            user_agent: row.try_get("user_agent")?,
            ip_address: row.try_get("ip_address")?,
            incremental_id_per_endpoint: row.try_get("incremental_id_per_endpoint")?,
            random_id_per_application: row.try_get("random_id_per_application")?,
            on_demand_perpetual: row.try_get("on_demand_perpetual")?,
            on_demand_year: row.try_get("on_demand_year")?,
            on_demand_month: row.try_get("on_demand_month")?,
            transformation_input: row.try_get("transformation_input")?,
            transformation_output: row.try_get("transformation_output")?,
            failure_kind: row.try_get("failure_kind")?,
            exception_message: row.try_get("exception_message")?,
            http_request_failed_url: row.try_get("http_request_failed_url")?,
            http_request_failed_status_code: row.try_get("http_request_failed_status_code")?,
            transformation_error_message: row.try_get("transformation_error_message")?,
        })
    }

    fn into_record(self) -> Result<RequestLogRecord, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))?;
        let environment: Environment = self
            .environment
            .parse()
            .map_err(|e| RepositoryError::Query(format!("{e}")))?;
        let status_code = u16::try_from(self.status_code)
            .map_err(|_| RepositoryError::Query(format!("invalid status code: {}", self.status_code)))?;
        let random_id_per_application = self
            .random_id_per_application
            .map(|v| {
                RandomRequestId::new(v)
                    .ok_or_else(|| RepositoryError::Query(format!("invalid random id: {v}")))
            })
            .transpose()?;
        let failure_kind = self
            .failure_kind
            .map(|s| s.parse::<FailureKind>().map_err(RepositoryError::Query))
            .transpose()?;
        let http_request_failed_status_code = self
            .http_request_failed_status_code
            .map(|v| {
                u16::try_from(v).map_err(|_| RepositoryError::Query(format!("invalid HTTP status: {v}")))
            })
            .transpose()?;

        Ok(RequestLogRecord {
            id,
            application: self.application,
            environment,
            endpoint: self.endpoint,
            datetime_utc: parse_datetime(&self.datetime_utc)?,
            duration_ms: self.duration_ms,
            status_code,
            user_agent: self.user_agent,
            ip_address: self.ip_address,
            incremental_id_per_endpoint: self.incremental_id_per_endpoint,
            random_id_per_application,
            on_demand_perpetual: self.on_demand_perpetual,
            on_demand_year: self.on_demand_year,
            on_demand_month: self.on_demand_month,
            transformation_input: parse_json("transformation_input", self.transformation_input)?,
            transformation_output: parse_json("transformation_output", self.transformation_output)?,
            failure_kind,
            exception_message: self.exception_message,
            http_request_failed_url: self.http_request_failed_url,
            http_request_failed_status_code,
            transformation_error_message: self.transformation_error_message,
        })
    }
}

// ---------------------------------------------------------------------------
// AttemptTransaction
// ---------------------------------------------------------------------------

impl AttemptTransaction for SqliteTransaction {
    async fn fetch_application_config(
        &self,
        application: &str,
    ) -> Result<ApplicationConfig, RepositoryError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;

        let row = sqlx::query(
            "SELECT display_name, locked, debug_allowed FROM application_config WHERE application = ?",
        )
        .bind(application)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            None => Ok(ApplicationConfig::default()),
            Some(row) => Ok(ApplicationConfig {
                display_name: row
                    .try_get("display_name")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?,
                locked: row
                    .try_get("locked")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?,
                debug_allowed: row
                    .try_get("debug_allowed")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?,
            }),
        }
    }

    async fn lock_application(
        &self,
        application: &str,
        environment: Environment,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;

        sqlx::query(
            r#"INSERT INTO application_publish (application, environment, locked_at)
               VALUES (?, ?, ?)
               ON CONFLICT(application, environment) DO UPDATE SET locked_at = excluded.locked_at"#,
        )
        .bind(application)
        .bind(environment.as_str())
        .bind(format_datetime(&Utc::now()))
        .execute(&mut **tx)
        .await
        .map_err(|e| RepositoryError::Query(format!("lock application: {e}")))?;

        tracing::debug!(application, %environment, "application locked");
        Ok(())
    }

    async fn max_incremental_id(
        &self,
        application: &str,
        environment: Environment,
        endpoint: &str,
    ) -> Result<Option<i64>, RepositoryError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;

        sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(incremental_id_per_endpoint) FROM request_log \
             WHERE application = ? AND environment = ? AND endpoint = ?",
        )
        .bind(application)
        .bind(environment.as_str())
        .bind(endpoint)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn max_counter_value(
        &self,
        application: &str,
        environment: Environment,
        kind: CounterKind,
        window: CounterWindow,
    ) -> Result<Option<i64>, RepositoryError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;

        let mut sql = format!(
            "SELECT MAX({}) FROM request_log WHERE application = ? AND environment = ?",
            counter_column(kind)
        );
        if window.is_some() {
            sql.push_str(" AND datetime_utc >= ? AND datetime_utc < ?");
        }

        let mut query = sqlx::query_scalar::<_, Option<i64>>(&sql)
            .bind(application)
            .bind(environment.as_str());
        if let Some((start, end)) = window {
            query = query.bind(format_datetime(&start)).bind(format_datetime(&end));
        }

        query
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn random_id_exists(
        &self,
        application: &str,
        environment: Environment,
        id: RandomRequestId,
    ) -> Result<bool, RepositoryError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM request_log \
             WHERE application = ? AND environment = ? AND random_id_per_application = ?",
        )
        .bind(application)
        .bind(environment.as_str())
        .bind(id.value())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(count > 0)
    }

    async fn insert_request_log(&self, record: &RequestLogRecord) -> Result<(), RepositoryError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;

        sqlx::query(&format!(
            "INSERT INTO request_log ({REQUEST_LOG_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(record.id.to_string())
        .bind(&record.application)
        .bind(record.environment.as_str())
        .bind(&record.endpoint)
        .bind(format_datetime(&record.datetime_utc))
        .bind(record.duration_ms)
        .bind(i64::from(record.status_code))
        .bind(&record.user_agent)
        .bind(&record.ip_address)
        .bind(record.incremental_id_per_endpoint)
        .bind(record.random_id_per_application.map(|id| id.value()))
        .bind(record.on_demand_perpetual)
        .bind(record.on_demand_year)
        .bind(record.on_demand_month)
        .bind(json_column(&record.transformation_input))
        .bind(json_column(&record.transformation_output))
        .bind(record.failure_kind.map(|k| k.as_str()))
        .bind(&record.exception_message)
        .bind(&record.http_request_failed_url)
        .bind(record.http_request_failed_status_code.map(i64::from))
        .bind(&record.transformation_error_message)
        .execute(&mut **tx)
        .await
        .map_err(|e| RepositoryError::Query(format!("insert request log: {e}")))?;

        Ok(())
    }

    async fn list_request_log(&self, application: &str) -> Result<Vec<RequestLogRecord>, RepositoryError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionFinished)?;

        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_LOG_COLUMNS} FROM request_log WHERE application = ? ORDER BY datetime_utc, id"
        ))
        .bind(application)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(record_from_row).collect()
    }

    async fn commit(&self) -> Result<(), RepositoryError> {
        self.take()
            .await?
            .commit()
            .await
            .map_err(|e| RepositoryError::Query(format!("commit: {e}")))
    }

    async fn rollback(&self) -> Result<(), RepositoryError> {
        self.take()
            .await?
            .rollback()
            .await
            .map_err(|e| RepositoryError::Query(format!("rollback: {e}")))
    }
}
