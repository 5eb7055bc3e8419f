//! Dotted-path accessors over JSON bodies
//!
//! Broker bodies are schema-validated but structurally loose; handlers read
//! them through these helpers instead of unwrapping nested maps by hand.

use serde_json::Value;

/// Resolve a dotted path (`"artifact.id"`) against a JSON value.
///
/// Returns `None` if any intermediate segment is missing or not an object.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = value;
    for seg in path.split('.') {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

/// Resolve a dotted path to a non-empty string.
pub fn get_str<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    get_path(value, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Resolve a dotted path to an unsigned integer.
///
/// Accepts a JSON number or a numeric string; build systems are not
/// consistent about which one they emit for ids.
pub fn get_u64(value: &Value, path: &str) -> Option<u64> {
    match get_path(value, path)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_lookup() {
        let v = json!({"artifact": {"id": 42, "type": "koji-build"}});
        assert_eq!(get_u64(&v, "artifact.id"), Some(42));
        assert_eq!(get_str(&v, "artifact.type"), Some("koji-build"));
        assert!(get_path(&v, "artifact.missing").is_none());
        assert!(get_path(&v, "artifact.id.deeper").is_none());
    }

    #[test]
    fn empty_string_is_absent() {
        let v = json!({"pipeline": {"id": ""}});
        assert_eq!(get_str(&v, "pipeline.id"), None);
    }

    #[test]
    fn numeric_string_id() {
        let v = json!({"artifact": {"id": "1728223"}});
        assert_eq!(get_u64(&v, "artifact.id"), Some(1728223));
    }
}
