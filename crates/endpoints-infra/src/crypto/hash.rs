//! HMAC-SHA256 request hashing.
//!
//! Implements the `RequestHasher` trait from `endpoints-core` with the `hmac`
//! and `sha2` crates (RustCrypto ecosystem).

use endpoints_core::auth::RequestHasher;
use endpoints_core::error::EngineError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of the canonical request text, keyed with one
/// of the application's secret keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacRequestHasher;

impl HmacRequestHasher {
    pub fn new() -> Self {
        Self
    }
}

impl RequestHasher for HmacRequestHasher {
    fn hash(&self, secret_key: &str, text: &str) -> Result<String, EngineError> {
        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|e| EngineError::Configuration(format!("invalid secret key: {e}")))?;
        mac.update(text.as_bytes());
        Ok(hex_encode(&mac.finalize().into_bytes()))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use endpoints_core::auth::{RequestAuthenticator, canonical_text};
    use endpoints_types::application::{Application, ApplicationDefinition, Environment};

    #[test]
    fn test_rfc4231_vector() {
        let hash = HmacRequestHasher
            .hash("Jefe", "what do ya want for nothing?")
            .unwrap();
        assert_eq!(
            hash,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_different_keys_differ() {
        let text = canonical_text(Environment::Live, "checkout", &BTreeMap::new());
        let a = HmacRequestHasher.hash("k1", &text).unwrap();
        let b = HmacRequestHasher.hash("k2", &text).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_any_key_verifies_case_insensitively() {
        let definition: ApplicationDefinition = toml::from_str(
            r#"
name = "shop"
secret_keys = ["new", "old"]
"#,
        )
        .unwrap();
        let application = Application::from_definition(definition).unwrap();
        let parameters = BTreeMap::from([("order".to_string(), "7".to_string())]);
        let text = canonical_text(Environment::Live, "checkout", &parameters);
        let old = HmacRequestHasher.hash("old", &text).unwrap().to_uppercase();

        let authenticator = RequestAuthenticator::new(Arc::new(HmacRequestHasher), true, false);
        assert!(
            authenticator
                .is_valid(&old, &application, Environment::Live, "checkout", &parameters)
                .unwrap()
        );
        assert!(
            !authenticator
                .is_valid("00", &application, Environment::Live, "checkout", &parameters)
                .unwrap()
        );
    }
}
