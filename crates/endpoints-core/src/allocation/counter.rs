//! On-demand counters.
//!
//! A counter's value is the highest value previously logged for the same
//! (application, environment, kind) within the current window, plus one.
//! Values are fetched lazily and memoized per attempt; the lock held by the
//! attempt serialises the read-then-assign across attempts.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use endpoints_types::application::Environment;
use endpoints_types::request_log::{CounterKind, RequestLogRecord};
use tokio::sync::OnceCell;

use crate::error::EngineError;
use crate::repository::{AttemptTransaction, CounterWindow};

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, EngineError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| EngineError::Internal(format!("invalid counter window start {year}-{month}")))
}

fn local_midnight(date: NaiveDate, timezone: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    timezone
        .from_local_datetime(&midnight)
        .earliest()
        // Midnight skipped by a DST transition; the day starts an hour later.
        .or_else(|| {
            timezone
                .from_local_datetime(&(midnight + chrono::TimeDelta::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// The window containing `at`, with calendar boundaries taken in `timezone`.
pub fn counter_window(
    kind: CounterKind,
    at: DateTime<Utc>,
    timezone: Tz,
) -> Result<CounterWindow, EngineError> {
    let local = at.with_timezone(&timezone);
    let (year, month) = (local.year(), local.month());

    let (start, end) = match kind {
        CounterKind::Perpetual => return Ok(None),
        CounterKind::Year => (first_of_month(year, 1)?, first_of_month(year + 1, 1)?),
        CounterKind::Month => {
            let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
            (first_of_month(year, month)?, first_of_month(next_year, next_month)?)
        }
    };

    Ok(Some((local_midnight(start, timezone), local_midnight(end, timezone))))
}

/// The three lazily fetched counters of one attempt.
pub struct OnDemandCounters<X> {
    tx: Arc<X>,
    application: String,
    environment: Environment,
    timezone: Tz,
    now: DateTime<Utc>,
    perpetual: OnceCell<i64>,
    year: OnceCell<i64>,
    month: OnceCell<i64>,
}

impl<X: AttemptTransaction> OnDemandCounters<X> {
    pub fn new(
        tx: Arc<X>,
        application: impl Into<String>,
        environment: Environment,
        timezone: Tz,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tx,
            application: application.into(),
            environment,
            timezone,
            now,
            perpetual: OnceCell::new(),
            year: OnceCell::new(),
            month: OnceCell::new(),
        }
    }

    fn cell(&self, kind: CounterKind) -> &OnceCell<i64> {
        match kind {
            CounterKind::Perpetual => &self.perpetual,
            CounterKind::Year => &self.year,
            CounterKind::Month => &self.month,
        }
    }

    /// The counter's value for this attempt, fetched on first use.
    pub async fn get_or_fetch(&self, kind: CounterKind) -> Result<i64, EngineError> {
        self.cell(kind)
            .get_or_try_init(|| self.fetch(kind))
            .await
            .copied()
    }

    async fn fetch(&self, kind: CounterKind) -> Result<i64, EngineError> {
        let window = counter_window(kind, self.now, self.timezone)?;
        let max = self
            .tx
            .max_counter_value(&self.application, self.environment, kind, window)
            .await?;
        let value = max.map_or(1, |m| m + 1);
        tracing::debug!(
            application = %self.application,
            environment = %self.environment,
            counter = %kind,
            value,
            "on-demand counter fetched"
        );
        Ok(value)
    }

    /// Kinds fetched so far, with their values.
    pub fn fetched(&self) -> Vec<(CounterKind, i64)> {
        CounterKind::ALL
            .into_iter()
            .filter_map(|kind| self.cell(kind).get().map(|v| (kind, *v)))
            .collect()
    }

    pub fn record_into(&self, record: &mut RequestLogRecord) {
        for (kind, value) in self.fetched() {
            record.set_counter(kind, value);
        }
    }
}
