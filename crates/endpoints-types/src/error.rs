use thiserror::Error;

/// Errors in application or endpoint declarations, detected at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),

    #[error("application '{0}' declares no secret keys")]
    NoSecretKeys(String),

    #[error("endpoint '{0}' is declared more than once")]
    DuplicateEndpoint(String),

    #[error("endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    #[error("invalid environment '{0}': expected 'preview' or 'live'")]
    InvalidEnvironment(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Errors from repository operations (used by trait definitions in endpoints-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transaction already finished")]
    TransactionFinished,
}
