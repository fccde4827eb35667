//! SQLite storage: connection pools and the request store.

pub mod pool;
pub mod request_store;

pub use pool::StorePools;
pub use request_store::{SqliteRequestStore, SqliteTransaction};
