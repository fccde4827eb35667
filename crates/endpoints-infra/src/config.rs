//! Configuration loading.
//!
//! Reads `config.toml` from the data directory (`~/.endpoints/` unless
//! `ENDPOINTS_DATA_DIR` says otherwise) into [`DeploymentConfig`], applies
//! environment overrides, and loads application definitions. Environment
//! access goes through a lookup function so callers (and tests) decide where
//! variables come from.

use std::path::{Path, PathBuf};

use endpoints_types::application::{Application, ApplicationDefinition};
use endpoints_types::config::DeploymentConfig;
use endpoints_types::error::ConfigError;

pub const DATA_DIR_ENV: &str = "ENDPOINTS_DATA_DIR";

/// Reads a variable from the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn lookup_non_empty(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.trim().is_empty())
}

/// `$ENDPOINTS_DATA_DIR`, falling back to `~/.endpoints`.
pub fn default_data_dir(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = lookup_non_empty(&lookup, DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".endpoints"),
        None => PathBuf::from(".endpoints"),
    }
}

/// The configured database URL, or `endpoints.db` inside `data_dir`.
pub fn database_url(config: &DeploymentConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| format!("sqlite://{}?mode=rwc", data_dir.join("endpoints.db").display()))
}

/// Load `{data_dir}/config.toml` and apply environment overrides.
///
/// A missing file yields the defaults; a malformed one logs a warning and
/// yields the defaults.
pub async fn load_deployment_config(
    data_dir: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> DeploymentConfig {
    let config_path = data_dir.join("config.toml");

    let mut config = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => match toml::from_str::<DeploymentConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %config_path.display(), "failed to parse config: {err}, using defaults");
                DeploymentConfig::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %config_path.display(), "no config.toml found, using defaults");
            DeploymentConfig::default()
        }
        Err(err) => {
            tracing::warn!(path = %config_path.display(), "failed to read config: {err}, using defaults");
            DeploymentConfig::default()
        }
    };

    apply_env_overrides(&mut config, lookup);
    config
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Override fields from `ENDPOINTS_*` variables. Unparseable values are
/// logged and ignored.
pub fn apply_env_overrides(config: &mut DeploymentConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup_non_empty(&lookup, "ENDPOINTS_DATABASE_URL") {
        config.database_url = Some(url);
    }

    let flags: [(&str, &mut bool); 3] = [
        ("ENDPOINTS_CHECK_HASH", &mut config.check_hash),
        ("ENDPOINTS_DISPLAY_EXPECTED_HASH", &mut config.display_expected_hash),
        ("ENDPOINTS_TRANSFORMATION_DEBUG_LOG", &mut config.transformation_debug_log),
    ];
    for (name, field) in flags {
        if let Some(raw) = lookup_non_empty(&lookup, name) {
            match parse_bool(&raw) {
                Some(value) => *field = value,
                None => tracing::warn!(variable = name, value = %raw, "ignoring invalid boolean"),
            }
        }
    }

    if let Some(raw) = lookup_non_empty(&lookup, "ENDPOINTS_WORKER_POOL_SIZE") {
        match raw.trim().parse::<usize>() {
            Ok(size) => config.worker_pool_size = size,
            Err(_) => tracing::warn!(variable = "ENDPOINTS_WORKER_POOL_SIZE", value = %raw, "ignoring invalid pool size"),
        }
    }
}

/// Parse and validate an application definition from TOML text.
pub fn parse_application(content: &str) -> Result<Application, ConfigError> {
    let definition: ApplicationDefinition =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Application::from_definition(definition)
}

/// Load and validate an application definition file.
pub async fn load_application(path: &Path) -> Result<Application, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Parse(format!("failed to read {}: {e}", path.display())))?;
    parse_application(&content)
}
