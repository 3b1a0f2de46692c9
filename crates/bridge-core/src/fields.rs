//! Tolerant field lookup over loosely-shaped JSON payloads.
//!
//! Gateway frames are produced by several generations of the upstream
//! protocol and mix camelCase and snake_case spellings for the same
//! logical field. Every probe in this module lives here so the rest of
//! the crate can pattern-match on clean, already-normalized values.
use serde_json::Value;

/// Returns the first non-null value found at any of `keys`, in order.
pub fn probe_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| value.get(key)?.as_str())
}

/// Same as [`probe_str`] but returns an owned `String`.
pub fn probe_string(value: &Value, keys: &[&str]) -> Option<String> {
    probe_str(value, keys).map(str::to_owned)
}

/// Returns the first present value (of any JSON type) found at any of `keys`.
pub fn probe<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        let found = value.get(key)?;
        if found.is_null() {
            None
        } else {
            Some(found)
        }
    })
}

/// Returns the first value coercible to `f64` found at any of `keys`.
pub fn probe_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| value.get(key)?.as_f64())
}

/// Returns the first value coercible to `u64` found at any of `keys`.
pub fn probe_u64(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| value.get(key)?.as_u64())
}

/// Flattens an array found at any of `keys` (or a single object treated as a
/// one-element array), additionally unwrapping any of `entries`, `items`,
/// `calls`, `results`, `operations`, `events` nested one level inside each
/// element.
pub fn flatten_entries(value: &Value, keys: &[&str]) -> Vec<Value> {
    const NESTED_KEYS: &[&str] = &["entries", "items", "calls", "results", "operations", "events"];

    let Some(found) = probe(value, keys) else {
        return Vec::new();
    };

    let top_level: Vec<Value> = match found {
        Value::Array(items) => items.clone(),
        Value::Object(_) => vec![found.clone()],
        _ => return Vec::new(),
    };

    let mut flattened = Vec::with_capacity(top_level.len());
    for item in top_level {
        let mut expanded = false;
        for nested_key in NESTED_KEYS {
            if let Some(Value::Array(nested)) = item.get(*nested_key) {
                flattened.extend(nested.iter().cloned());
                expanded = true;
                break;
            }
        }
        if !expanded {
            flattened.push(item);
        }
    }
    flattened
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_probe_str_prefers_first_present_key() {
        let payload = json!({"agent_id": "a1", "agentId": "a2"});
        assert_eq!(probe_str(&payload, &["agentId", "agent_id"]), Some("a2"));
        assert_eq!(probe_str(&payload, &["agent_id"]), Some("a1"));
        assert_eq!(probe_str(&payload, &["missing"]), None);
    }

    #[test]
    fn unit_flatten_entries_unwraps_nested_items() {
        let payload = json!({
            "toolCalls": {"items": [{"toolName": "a"}, {"toolName": "b"}]},
        });
        let flattened = flatten_entries(&payload, &["toolCalls"]);
        assert_eq!(flattened.len(), 2);
    }

    #[test]
    fn unit_flatten_entries_treats_bare_object_as_single_entry() {
        let payload = json!({"tool": {"toolName": "only"}});
        let flattened = flatten_entries(&payload, &["tool"]);
        assert_eq!(flattened.len(), 1);
    }

    #[test]
    fn functional_probe_u64_skips_non_numeric_keys() {
        let payload = json!({"inputTokens": "not-a-number", "input_tokens": 42});
        assert_eq!(probe_u64(&payload, &["inputTokens", "input_tokens"]), Some(42));
    }
}
