//! Infrastructure layer for the endpoints engine.
//!
//! Contains implementations of the ports defined in `endpoints-core`: SQLite
//! storage, HMAC-SHA256 request hashing, reqwest HTTP, JEXL parameter
//! transformations and template documents, plus configuration loading.

pub mod config;
pub mod crypto;
pub mod http;
pub mod sqlite;
pub mod transform;

use std::sync::Arc;

use endpoints_core::engine::{Collaborators, EndpointEngine};
use endpoints_types::config::DeploymentConfig;

use crate::crypto::HmacRequestHasher;
use crate::http::{DEFAULT_TIMEOUT, ReqwestHttpClient};
use crate::sqlite::{SqliteRequestStore, StorePools};
use crate::transform::{JexlTransformer, TemplateDocumentGenerator};

/// Errors while assembling the production engine.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to open database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Collaborators backed by this crate's adapters.
pub fn default_collaborators() -> Result<Collaborators, reqwest::Error> {
    Ok(Collaborators::new(
        Arc::new(HmacRequestHasher),
        Arc::new(JexlTransformer),
        Arc::new(TemplateDocumentGenerator),
        Arc::new(ReqwestHttpClient::new(DEFAULT_TIMEOUT)?),
    ))
}

/// Open the database at `database_url` and build an engine on top of it.
pub async fn build_engine(
    database_url: &str,
    config: DeploymentConfig,
) -> Result<EndpointEngine<SqliteRequestStore>, BuildError> {
    let pools = StorePools::open(database_url).await?;
    let collaborators = default_collaborators()?;
    Ok(EndpointEngine::new(SqliteRequestStore::new(pools), config, collaborators))
}
