//! Application and environment types.
//!
//! An `Application` is a tenant: it owns endpoints, an ordered list of secret
//! keys used for request-hash verification, and the timezone that bounds the
//! year/month counter windows. `ApplicationDefinition` is the serialized form
//! loaded from disk; `Application::from_definition` validates it and flattens
//! the endpoint folder tree.

use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::endpoint::{Endpoint, EndpointFolder, ResponseKind};
use crate::error::ConfigError;

/// Deployment stage that scopes locks, counters, random ids and audit rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Preview,
    #[default]
    Live,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Preview => "preview",
            Environment::Live => "live",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preview" => Ok(Environment::Preview),
            "live" => Ok(Environment::Live),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }
}

/// Serialized application definition (`application.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationDefinition {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Newest key first. Every key remains valid for verification.
    pub secret_keys: Vec<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub endpoints: EndpointFolder,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// A validated application with its flattened endpoint list.
#[derive(Debug, Clone)]
pub struct Application {
    pub name: String,
    pub display_name: Option<String>,
    pub secret_keys: Vec<String>,
    pub timezone: Tz,
    pub endpoints: Vec<Endpoint>,
}

impl Application {
    /// Validate a definition and flatten its endpoint tree.
    ///
    /// Parameter declarations are aggregated from every ancestor folder, the
    /// nearest declaration winning.
    pub fn from_definition(definition: ApplicationDefinition) -> Result<Self, ConfigError> {
        if definition.secret_keys.is_empty() {
            return Err(ConfigError::NoSecretKeys(definition.name));
        }

        let timezone: Tz = definition
            .timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(definition.timezone.clone()))?;

        let endpoints = definition.endpoints.flatten()?;
        validate_responses(&endpoints)?;

        Ok(Self {
            name: definition.name,
            display_name: definition.display_name,
            secret_keys: definition.secret_keys,
            timezone,
            endpoints,
        })
    }

    pub fn find_endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// The key handed to parameter transformations (the newest one).
    pub fn current_secret_key(&self) -> Option<&str> {
        self.secret_keys.first().map(String::as_str)
    }
}

fn validate_responses(endpoints: &[Endpoint]) -> Result<(), ConfigError> {
    for endpoint in endpoints {
        if let ResponseKind::ForwardToEndpoint { .. } = endpoint.error.kind {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: endpoint.name.clone(),
                message: "an error response cannot forward to another endpoint".to_string(),
            });
        }

        if let ResponseKind::ForwardToEndpoint { endpoint: target, .. } = &endpoint.success.kind {
            if !endpoints.iter().any(|e| &e.name == target) {
                return Err(ConfigError::InvalidEndpoint {
                    endpoint: endpoint.name.clone(),
                    message: format!("forward target '{target}' not found"),
                });
            }
        }
    }
    Ok(())
}

/// Per-application settings stored in the database (`application_config`).
///
/// A missing row means an unlocked application with debugging disallowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub display_name: Option<String>,
    /// Administratively locked applications reject every request.
    pub locked: bool,
    pub debug_allowed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"
name = "shop"
display_name = "Shop"
secret_keys = ["k2", "k1"]
timezone = "Europe/Vienna"

[endpoints.parameters.lang]
default = "en"

[[endpoints.endpoints]]
name = "checkout"
success = { type = "forward-to-endpoint", endpoint = "thanks" }
error = { type = "empty" }

[endpoints.endpoints.parameters.order]

[[endpoints.endpoints]]
name = "thanks"
success = { type = "empty" }
error = { type = "empty" }
"#;

    fn definition() -> ApplicationDefinition {
        toml::from_str(DEFINITION).unwrap()
    }

    #[test]
    fn test_environment_roundtrip() {
        assert_eq!("live".parse::<Environment>().unwrap(), Environment::Live);
        assert_eq!("PREVIEW".parse::<Environment>().unwrap(), Environment::Preview);
        assert_eq!(Environment::Preview.to_string(), "preview");
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_from_definition_flattens_and_inherits_parameters() {
        let app = Application::from_definition(definition()).unwrap();
        assert_eq!(app.timezone, chrono_tz::Europe::Vienna);
        assert_eq!(app.current_secret_key(), Some("k2"));

        let checkout = app.find_endpoint("checkout").unwrap();
        assert!(checkout.parameters.contains_key("order"));
        assert_eq!(
            checkout.parameters["lang"].default_value.as_deref(),
            Some("en")
        );
        assert!(app.find_endpoint("missing").is_none());
    }

    #[test]
    fn test_from_definition_rejects_unknown_timezone() {
        let mut def = definition();
        def.timezone = "Mars/Olympus".to_string();
        let err = Application::from_definition(def).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimezone(_)));
    }

    #[test]
    fn test_from_definition_rejects_missing_keys() {
        let mut def = definition();
        def.secret_keys.clear();
        let err = Application::from_definition(def).unwrap_err();
        assert!(matches!(err, ConfigError::NoSecretKeys(_)));
    }

    #[test]
    fn test_from_definition_rejects_unknown_forward_target() {
        let mut def = definition();
        def.endpoints.endpoints.retain(|e| e.name != "thanks");
        let err = Application::from_definition(def).unwrap_err();
        assert!(err.to_string().contains("forward target 'thanks' not found"));
    }

    #[test]
    fn test_application_config_default_is_unlocked() {
        let config = ApplicationConfig::default();
        assert!(!config.locked);
        assert!(!config.debug_allowed);
    }
}
