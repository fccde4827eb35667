//! Request-hash authentication.
//!
//! A caller proves knowledge of one of the application's secret keys by
//! supplying a hash over the canonical request text. Every key owned by the
//! application is tried, so rotated-out keys keep working until removed.

use std::collections::BTreeMap;
use std::sync::Arc;

use endpoints_types::application::{Application, Environment};
use endpoints_types::endpoint::Endpoint;

use crate::error::EngineError;

/// Computes the keyed hash of a canonical request text.
pub trait RequestHasher: Send + Sync {
    /// Lowercase hex digest of `text` keyed with `secret_key`.
    fn hash(&self, secret_key: &str, text: &str) -> Result<String, EngineError>;
}

/// `environment \n endpoint \n (name=value \n)*`, parameters sorted by name.
pub fn canonical_text(
    environment: Environment,
    endpoint: &str,
    parameters: &BTreeMap<String, String>,
) -> String {
    let mut text = format!("{environment}\n{endpoint}\n");
    for (name, value) in parameters {
        text.push_str(name);
        text.push('=');
        text.push_str(value);
        text.push('\n');
    }
    text
}

/// The parameters participating in the endpoint's hash.
pub fn hash_parameters(
    endpoint: &Endpoint,
    parameters: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    match &endpoint.parameters_for_hash {
        None => parameters.clone(),
        Some(names) => parameters
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect(),
    }
}

#[derive(Clone)]
pub struct RequestAuthenticator {
    hasher: Arc<dyn RequestHasher>,
    check_hash: bool,
    display_expected_hash: bool,
}

impl RequestAuthenticator {
    pub fn new(hasher: Arc<dyn RequestHasher>, check_hash: bool, display_expected_hash: bool) -> Self {
        Self {
            hasher,
            check_hash,
            display_expected_hash,
        }
    }

    /// The hash a caller should send, computed with the newest key.
    pub fn expected_hash(
        &self,
        application: &Application,
        environment: Environment,
        endpoint: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Option<String>, EngineError> {
        let text = canonical_text(environment, endpoint, parameters);
        application
            .current_secret_key()
            .map(|key| self.hasher.hash(key, &text))
            .transpose()
    }

    pub fn is_valid(
        &self,
        supplied: &str,
        application: &Application,
        environment: Environment,
        endpoint: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<bool, EngineError> {
        if !self.check_hash {
            return Ok(true);
        }

        let text = canonical_text(environment, endpoint, parameters);
        // Oldest key first.
        for key in application.secret_keys.iter().rev() {
            if self.hasher.hash(key, &text)?.eq_ignore_ascii_case(supplied) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Fail with a client error unless `supplied` matches one of the keys.
    ///
    /// Outside `live`, when configured, the error names the expected hash.
    pub fn verify(
        &self,
        supplied: &str,
        application: &Application,
        environment: Environment,
        endpoint: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<(), EngineError> {
        if self.is_valid(supplied, application, environment, endpoint, parameters)? {
            return Ok(());
        }

        tracing::debug!(application = %application.name, %environment, endpoint, "request hash rejected");

        if self.display_expected_hash && environment != Environment::Live {
            if let Some(expected) = self.expected_hash(application, environment, endpoint, parameters)? {
                return Err(EngineError::request_invalid(format!(
                    "Hash '{supplied}' is wrong; expected '{expected}'"
                )));
            }
        }
        Err(EngineError::request_invalid(format!("Hash '{supplied}' is wrong")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use endpoints_types::application::ApplicationDefinition;

    use crate::test_support::StdHasher;

    fn application() -> Application {
        Application::from_definition(ApplicationDefinition {
            name: "shop".into(),
            display_name: None,
            secret_keys: vec!["k2".into(), "k1".into()],
            timezone: "UTC".into(),
            endpoints: Default::default(),
        })
        .unwrap()
    }

    fn params() -> BTreeMap<String, String> {
        BTreeMap::from([("b".to_string(), "2".to_string()), ("a".to_string(), "1".to_string())])
    }

    fn hash_with(key: &str) -> String {
        StdHasher
            .hash(key, &canonical_text(Environment::Live, "checkout", &params()))
            .unwrap()
    }

    #[test]
    fn test_canonical_text_sorted() {
        assert_eq!(
            canonical_text(Environment::Preview, "checkout", &params()),
            "preview\ncheckout\na=1\nb=2\n"
        );
    }

    #[test]
    fn test_any_key_accepted_case_insensitive() {
        let auth = RequestAuthenticator::new(Arc::new(StdHasher), true, false);
        let app = application();

        let with_k2 = hash_with("k2").to_uppercase();
        assert!(auth.is_valid(&with_k2, &app, Environment::Live, "checkout", &params()).unwrap());
        assert!(auth.is_valid(&hash_with("k1"), &app, Environment::Live, "checkout", &params()).unwrap());
        assert!(!auth.is_valid(&hash_with("k3"), &app, Environment::Live, "checkout", &params()).unwrap());
    }

    #[test]
    fn test_disabled_check_accepts_everything() {
        let auth = RequestAuthenticator::new(Arc::new(StdHasher), false, false);
        assert!(auth.is_valid("nonsense", &application(), Environment::Live, "checkout", &params()).unwrap());
    }

    #[test]
    fn test_expected_hash_only_outside_live() {
        let auth = RequestAuthenticator::new(Arc::new(StdHasher), true, true);
        let app = application();

        let live = auth
            .verify("bad", &app, Environment::Live, "checkout", &params())
            .unwrap_err();
        assert_eq!(live.to_string(), "Hash 'bad' is wrong");

        let preview = auth
            .verify("bad", &app, Environment::Preview, "checkout", &params())
            .unwrap_err();
        assert!(preview.to_string().contains("expected '"));
        assert_eq!(preview.kind(), endpoints_types::request_log::FailureKind::ClientInput);
    }

    #[test]
    fn test_hash_parameters_restricts_selection() {
        let toml_str = r#"
name = "e"
parameters_for_hash = ["a"]
success = { type = "empty" }
error = { type = "empty" }
"#;
        let endpoint: Endpoint = toml::from_str(toml_str).unwrap();
        let selected = hash_parameters(&endpoint, &params());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected["a"], "1");
    }
}
