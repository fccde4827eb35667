//! Application state wiring the engine to its concrete adapters.

use endpoints_core::engine::EndpointEngine;
use endpoints_infra::config::{database_url, default_data_dir, load_deployment_config, process_env};
use endpoints_infra::sqlite::SqliteRequestStore;

pub type ConcreteEngine = EndpointEngine<SqliteRequestStore>;

/// Shared state for the commands that touch the database.
pub struct AppState {
    pub engine: ConcreteEngine,
}

impl AppState {
    /// Load configuration, open the database and assemble the engine.
    ///
    /// `database_override` takes precedence over `config.toml` and the
    /// environment.
    pub async fn init(database_override: Option<String>) -> anyhow::Result<Self> {
        let data_dir = default_data_dir(process_env);
        tokio::fs::create_dir_all(&data_dir).await?;

        let mut config = load_deployment_config(&data_dir, process_env).await;
        if let Some(url) = database_override {
            config.database_url = Some(url);
        }
        let db_url = database_url(&config, &data_dir);
        tracing::debug!(data_dir = %data_dir.display(), "opening database");

        let engine = endpoints_infra::build_engine(&db_url, config).await?;
        Ok(Self { engine })
    }
}
