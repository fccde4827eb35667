//! `${name}` placeholder substitution.

use std::collections::BTreeMap;

use crate::error::EngineError;

/// Replace every `${name}` in `pattern` with its value.
///
/// An unterminated `${` is copied literally. A name with no value is a
/// client error.
pub fn substitute(pattern: &str, values: &BTreeMap<String, String>) -> Result<String, EngineError> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let name = &after[..end];
        let value = values.get(name).ok_or_else(|| {
            EngineError::request_invalid(format!("Pattern '{pattern}' references unknown value '{name}'"))
        })?;
        out.push_str(value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("id".to_string(), "42".to_string()),
            ("lang".to_string(), "en".to_string()),
        ])
    }

    #[test]
    fn test_substitute_multiple() {
        assert_eq!(
            substitute("https://x.com/${lang}/items/${id}?again=${id}", &values()).unwrap(),
            "https://x.com/en/items/42?again=42"
        );
    }

    #[test]
    fn test_substitute_without_placeholders() {
        assert_eq!(substitute("plain", &values()).unwrap(), "plain");
    }

    #[test]
    fn test_unterminated_placeholder_is_literal() {
        assert_eq!(substitute("a ${id} ${oops", &values()).unwrap(), "a 42 ${oops");
    }

    #[test]
    fn test_unknown_name_is_client_error() {
        let err = substitute("${missing}", &values()).unwrap_err();
        assert!(matches!(err, EngineError::RequestInvalid(_)));
        assert!(err.to_string().contains("'missing'"));
    }
}
