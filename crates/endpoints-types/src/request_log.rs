//! Audit-log types.
//!
//! One `RequestLogRecord` is written per attempt, success or error. Counter
//! values and random ids recorded here are the history later attempts
//! compute their own allocations from.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::Environment;

/// Window of an on-demand counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    /// Never resets.
    Perpetual,
    /// Resets at the start of each calendar year in the application's timezone.
    Year,
    /// Resets at the start of each calendar month in the application's timezone.
    Month,
}

impl CounterKind {
    pub const ALL: [CounterKind; 3] = [CounterKind::Perpetual, CounterKind::Year, CounterKind::Month];

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Perpetual => "perpetual",
            CounterKind::Year => "year",
            CounterKind::Month => "month",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "perpetual" => Ok(CounterKind::Perpetual),
            "year" => Ok(CounterKind::Year),
            "month" => Ok(CounterKind::Month),
            other => Err(format!("invalid counter kind: '{other}'")),
        }
    }
}

/// A 10-digit request identifier, leading digit 1-9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct RandomRequestId(i64);

impl RandomRequestId {
    pub const MIN: i64 = 1_000_000_000;
    pub const MAX: i64 = 9_999_999_999;

    /// Returns `None` when `value` is not a 10-digit number.
    pub fn new(value: i64) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for RandomRequestId {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("random request id out of range: {value}"))
    }
}

impl From<RandomRequestId> for i64 {
    fn from(id: RandomRequestId) -> Self {
        id.0
    }
}

impl fmt::Display for RandomRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of a failed attempt, persisted in the audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ClientInput,
    Transformation,
    TaskExecution,
    Scheduling,
    Unclassified,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ClientInput => "client_input",
            FailureKind::Transformation => "transformation",
            FailureKind::TaskExecution => "task_execution",
            FailureKind::Scheduling => "scheduling",
            FailureKind::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client_input" => Ok(FailureKind::ClientInput),
            "transformation" => Ok(FailureKind::Transformation),
            "task_execution" => Ok(FailureKind::TaskExecution),
            "scheduling" => Ok(FailureKind::Scheduling),
            "unclassified" => Ok(FailureKind::Unclassified),
            other => Err(format!("invalid failure kind: '{other}'")),
        }
    }
}

/// One audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogRecord {
    pub id: Uuid,
    pub application: String,
    pub environment: Environment,
    pub endpoint: String,
    /// When the attempt started.
    pub datetime_utc: DateTime<Utc>,
    pub duration_ms: i64,
    pub status_code: u16,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub incremental_id_per_endpoint: Option<i64>,
    pub random_id_per_application: Option<RandomRequestId>,
    pub on_demand_perpetual: Option<i64>,
    pub on_demand_year: Option<i64>,
    pub on_demand_month: Option<i64>,
    pub transformation_input: Option<serde_json::Value>,
    pub transformation_output: Option<serde_json::Value>,
    pub failure_kind: Option<FailureKind>,
    pub exception_message: Option<String>,
    pub http_request_failed_url: Option<String>,
    pub http_request_failed_status_code: Option<u16>,
    pub transformation_error_message: Option<String>,
}

impl RequestLogRecord {
    /// A blank row for an attempt that started at `datetime_utc`.
    pub fn new(
        application: impl Into<String>,
        environment: Environment,
        endpoint: impl Into<String>,
        datetime_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            application: application.into(),
            environment,
            endpoint: endpoint.into(),
            datetime_utc,
            duration_ms: 0,
            status_code: 0,
            user_agent: None,
            ip_address: None,
            incremental_id_per_endpoint: None,
            random_id_per_application: None,
            on_demand_perpetual: None,
            on_demand_year: None,
            on_demand_month: None,
            transformation_input: None,
            transformation_output: None,
            failure_kind: None,
            exception_message: None,
            http_request_failed_url: None,
            http_request_failed_status_code: None,
            transformation_error_message: None,
        }
    }

    pub fn counter(&self, kind: CounterKind) -> Option<i64> {
        match kind {
            CounterKind::Perpetual => self.on_demand_perpetual,
            CounterKind::Year => self.on_demand_year,
            CounterKind::Month => self.on_demand_month,
        }
    }

    pub fn set_counter(&mut self, kind: CounterKind, value: i64) {
        match kind {
            CounterKind::Perpetual => self.on_demand_perpetual = Some(value),
            CounterKind::Year => self.on_demand_year = Some(value),
            CounterKind::Month => self.on_demand_month = Some(value),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure_kind.is_some()
    }
}
