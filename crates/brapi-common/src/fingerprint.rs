//! Canonical JSON fingerprints
//!
//! Produces stable digests of JSON documents regardless of key order and of
//! empty members, so that two logically identical filter sets hash the same.

use crate::error::Result;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Returns a copy of `value` with object keys sorted and empty members removed.
///
/// Empty means `null`, `""`, `[]` or `{}` after the member itself has been
/// canonicalised. Returns `None` when the whole value is empty.
pub fn canonicalize(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let items: Vec<Value> = items.iter().filter_map(canonicalize).collect();
            if items.is_empty() {
                None
            } else {
                Some(Value::Array(items))
            }
        },
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map
                .iter()
                .filter_map(|(key, member)| canonicalize(member).map(|member| (key, member)))
                .collect();
            if sorted.is_empty() {
                return None;
            }
            let mut out = Map::new();
            for (key, member) in sorted {
                out.insert(key.clone(), member);
            }
            Some(Value::Object(out))
        },
        other => Some(other.clone()),
    }
}

/// Serialise the canonical form of `value` (`null` when empty).
pub fn canonical_string(value: &Value) -> Result<String> {
    let canonical = canonicalize(value).unwrap_or(Value::Null);
    Ok(serde_json::to_string(&canonical)?)
}

/// Compute a hex SHA-256 digest over the canonical form of every part.
pub fn fingerprint(parts: &[&Value]) -> Result<String> {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(canonical_string(part)?.as_bytes());
        // Separator keeps ["ab", "c"] and ["a", "bc"] apart.
        hasher.update([0u8]);
    }
    Ok(hex::encode(hasher.finalize()))
}
