//! Fresh ID allocation for the translator.
//!
//! Every translation direction that fabricates a new message or tool-call id
//! needs a value guaranteed not to collide with anything already present in
//! the body being translated. IDs are timestamp+counter based so repeated
//! calls within the same process never collide.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_hex() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}{:x}", nanos, count)
}

pub fn fresh_message_id() -> String {
    format!("msg_{}", next_hex())
}

pub fn fresh_call_id() -> String {
    format!("call_{}", next_hex())
}

pub fn fresh_tool_use_id() -> String {
    format!("toolu_{}", next_hex())
}

/// Rename any tool-call id that collides with one already seen, returning the
/// (possibly renamed) id. `seen` accumulates every id handed out so far.
pub fn dedup_id(id: String, seen: &mut std::collections::HashSet<String>) -> String {
    if seen.insert(id.clone()) {
        return id;
    }
    let renamed = fresh_call_id();
    seen.insert(renamed.clone());
    renamed
}

/// Parse a JSON-arguments string, wrapping any non-object/array result as
/// `{"value": ...}` so downstream consumers always see a structured value.
pub fn parse_arguments(raw: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(v @ serde_json::Value::Object(_)) | Ok(v @ serde_json::Value::Array(_)) => v,
        Ok(other) => serde_json::json!({ "value": other }),
        Err(_) => serde_json::json!({ "value": raw }),
    }
}

/// Stringify a tool-call input for the wire, wrapping any non-object/array
/// value as `{"value": ...}` first so the round trip through `parse_arguments`
/// on the other side reconstructs the same shape.
pub fn stringify_arguments(input: &serde_json::Value) -> String {
    let wrapped = match input {
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => input.clone(),
        other => serde_json::json!({ "value": other }),
    };
    serde_json::to_string(&wrapped).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stringify_arguments_passes_objects_through() {
        let input = serde_json::json!({"cmd": "ls"});
        assert_eq!(stringify_arguments(&input), "{\"cmd\":\"ls\"}");
    }

    #[test]
    fn stringify_arguments_passes_arrays_through() {
        let input = serde_json::json!([1, 2]);
        assert_eq!(stringify_arguments(&input), "[1,2]");
    }

    #[test]
    fn stringify_arguments_wraps_scalars() {
        let input = serde_json::json!(5);
        assert_eq!(stringify_arguments(&input), "{\"value\":5}");
    }

    #[test]
    fn stringify_then_parse_arguments_round_trips_scalars() {
        let input = serde_json::json!(5);
        let wire = stringify_arguments(&input);
        assert_eq!(parse_arguments(&wire), serde_json::json!({"value": 5}));
    }
}
