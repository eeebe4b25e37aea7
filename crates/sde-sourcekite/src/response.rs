//! Response payload decoding.
//!
//! Sourcekite answers with a YAML-compatible superset of JSON (dotted bare
//! keys, bare enum-like values), so payloads are parsed with a YAML parser
//! and converted into `serde_json::Value` for the rest of the crate.
use serde_json::Value;

use crate::error::SourcekiteError;

/// Parse a raw response payload.
pub fn decode(raw: &str) -> Result<Value, SourcekiteError> {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(value) => Ok(value),
        Err(yaml_err) => {
            #[cfg(feature = "legacy-regex-decoder")]
            {
                if let Ok(value) = legacy::decode(raw) {
                    tracing::debug!("payload decoded by the legacy rewrite");
                    return Ok(value);
                }
            }
            Err(SourcekiteError::MalformedResponse(yaml_err.to_string()))
        }
    }
}

/// Return `value[key]`, or `Value::Null` when the field is absent.
pub fn project(value: &Value, key: &str) -> Value {
    value.get(key).cloned().unwrap_or(Value::Null)
}

/// Historical rewrite of bare keys and values into quoted JSON.
#[cfg(feature = "legacy-regex-decoder")]
mod legacy {
    use std::sync::OnceLock;

    use regex::Regex;
    use serde_json::Value;

    fn bare_key() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"(key\.[a-z_.]+):").expect("valid key regex"))
    }

    fn bare_value() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"(source\.[a-z_.]+),").expect("valid value regex"))
    }

    pub(super) fn decode(raw: &str) -> Result<Value, serde_json::Error> {
        let keyed = bare_key().replace_all(raw, "\"$1\":");
        let valued = bare_value().replace_all(&keyed, "\"$1\",");
        serde_json::from_str(&valued)
    }

}
