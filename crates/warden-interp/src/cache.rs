// cache.rs — Canonical cache keys for tool results.
//
// The cache itself lives in SessionState (it shares the session's
// lifetime); this module owns the keying discipline. Keys canonicalize
// the argument object — object keys sorted recursively — so two calls
// with the same arguments in different order hit the same entry.

use std::collections::BTreeMap;

/// Build the cache key for a call: the tool id and the canonicalized
/// argument JSON, joined with a separator no tool id contains.
pub fn cache_key(tool_id: &str, args: &serde_json::Value) -> String {
    format!("{tool_id}\u{1f}{}", canonical_json(args))
}

/// Serialize a JSON value with all object keys sorted, recursively.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<&String, String> = map
                .iter()
                .map(|(k, v)| (k, canonical_json(v)))
                .collect();
            let body: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{v}", serde_json::Value::from(k.as_str())))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        serde_json::Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}
