//! # Request Sanitization
//!
//! Filters sensitive header and parameter values out of a request before it
//! is attached to a report.

use crate::context::RequestContext;

/// Replacement for filtered values
pub const FILTERED: &str = "[FILTERED]";

/// Determines if a header or parameter name is sensitive. Blank entries match nothing.
fn is_sensitive_key(key: &str, redacted_keys: &[String]) -> bool {
    let key_lower = key.to_lowercase();
    redacted_keys
        .iter()
        .map(|sensitive| sensitive.trim())
        .filter(|sensitive| !sensitive.is_empty())
        .any(|sensitive| key_lower.contains(&sensitive.to_lowercase()))
}

fn redact_value(value: &mut serde_json::Value, redacted_keys: &[String]) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if is_sensitive_key(key, redacted_keys) {
                    *nested = serde_json::Value::String(FILTERED.to_string());
                } else {
                    redact_value(nested, redacted_keys);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item, redacted_keys);
            }
        }
        _ => {}
    }
}

/// Returns a copy of the request with sensitive values filtered.
///
/// Keys match case-insensitively on substring, so `password` also filters
/// `password_confirmation`. Nested parameter objects are filtered recursively.
pub fn redact_request(request: &RequestContext, redacted_keys: &[String]) -> RequestContext {
    let mut sanitized = request.clone();

    for (name, value) in sanitized.headers.iter_mut() {
        if is_sensitive_key(name, redacted_keys) {
            *value = FILTERED.to_string();
        }
    }

    for (key, value) in sanitized.params.iter_mut() {
        if is_sensitive_key(key, redacted_keys) {
            *value = serde_json::Value::String(FILTERED.to_string());
        } else {
            redact_value(value, redacted_keys);
        }
    }

    sanitized
}
