//! Connections to the request database.
//!
//! Attempt transactions run on `attempts`, a pool of exactly one connection.
//! An attempt holds SQLite's write lock from `lock_application` until it
//! commits, so concurrent attempts of this process queue for that connection
//! instead of spinning on the database lock. WAL lets the small read-only
//! `listings` pool serve request-log listings while an attempt is open.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// How long a statement waits while another process holds the write lock.
const LOCK_WAIT: Duration = Duration::from_secs(5);

/// How long an attempt queues for the attempt connection. An attempt may
/// hold it across outbound HTTP tasks, so this is far above `LOCK_WAIT`.
const ATTEMPT_QUEUE_WAIT: Duration = Duration::from_secs(60);

const LISTING_CONNECTIONS: u32 = 2;

/// The attempt connection and the listing pool of one database.
#[derive(Clone)]
pub struct StorePools {
    pub attempts: SqlitePool,
    pub listings: SqlitePool,
}

impl StorePools {
    /// Open the database, creating and migrating it on first use.
    pub async fn open(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(LOCK_WAIT)
            .create_if_missing(true);

        let attempts = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(ATTEMPT_QUEUE_WAIT)
            .connect_with(options.clone())
            .await?;

        // The read-only pool cannot open a database whose schema is missing.
        sqlx::migrate!("../../migrations").run(&attempts).await?;

        let listings = SqlitePoolOptions::new()
            .max_connections(LISTING_CONNECTIONS)
            .connect_with(options.read_only(true).create_if_missing(false))
            .await?;

        tracing::debug!(database_url, "request database opened");
        Ok(Self { attempts, listings })
    }
}
