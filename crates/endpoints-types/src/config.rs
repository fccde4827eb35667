//! Deployment configuration.
//!
//! `DeploymentConfig` represents `config.toml` in the data directory. It is
//! constructed once and passed explicitly to the engine; nothing reads it
//! from global state.

use serde::{Deserialize, Serialize};

/// Engine-wide settings. All fields have defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// SQLite URL. `None` means `endpoints.db` inside the data directory.
    #[serde(default)]
    pub database_url: Option<String>,

    /// When false every request hash is accepted.
    #[serde(default = "default_true")]
    pub check_hash: bool,

    /// Report one expected hash on a failed check (never in `live`).
    #[serde(default)]
    pub display_expected_hash: bool,

    /// Log transformation input/output documents at info level.
    #[serde(default)]
    pub transformation_debug_log: bool,

    /// Maximum number of work units running concurrently per attempt.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Maximum nesting of forward-to-endpoint responses.
    #[serde(default = "default_max_forward_depth")]
    pub max_forward_depth: usize,
}

fn default_true() -> bool {
    true
}

fn default_worker_pool_size() -> usize {
    8
}

fn default_max_forward_depth() -> usize {
    8
}

impl DeploymentConfig {
    /// Worker pool size clamped to at least one worker.
    pub fn effective_pool_size(&self) -> usize {
        self.worker_pool_size.max(1)
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            check_hash: default_true(),
            display_expected_hash: false,
            transformation_debug_log: false,
            worker_pool_size: default_worker_pool_size(),
            max_forward_depth: default_max_forward_depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_config_default_values() {
        let config = DeploymentConfig::default();
        assert!(config.database_url.is_none());
        assert!(config.check_hash);
        assert!(!config.display_expected_hash);
        assert!(!config.transformation_debug_log);
        assert_eq!(config.worker_pool_size, 8);
        assert_eq!(config.max_forward_depth, 8);
    }

    #[test]
    fn test_deployment_config_deserialize_with_defaults() {
        let config: DeploymentConfig = toml::from_str("").unwrap();
        assert_eq!(config, DeploymentConfig::default());
    }

    #[test]
    fn test_deployment_config_deserialize_with_values() {
        let toml_str = r#"
database_url = "sqlite:///tmp/e.db"
check_hash = false
worker_pool_size = 0
"#;
        let config: DeploymentConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database_url.as_deref(), Some("sqlite:///tmp/e.db"));
        assert!(!config.check_hash);
        assert_eq!(config.effective_pool_size(), 1);
        assert_eq!(config.max_forward_depth, 8);
    }
}
