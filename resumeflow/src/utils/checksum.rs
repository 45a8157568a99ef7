//! Canonical JSON encoding and SHA-256 checksums.
//!
//! Objects are re-keyed in sorted order at every depth before hashing, so
//! two values that differ only in map insertion order hash identically.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Returns a copy of `value` with every object's keys sorted.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Encodes a value as compact canonical JSON.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// Hex-encoded SHA-256 of raw bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Checksum of a JSON value's canonical form.
#[must_use]
pub fn checksum_value(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// Checksum of a JSON object with the given top-level keys removed.
///
/// Non-object values are hashed unchanged.
#[must_use]
pub fn checksum_excluding(value: &Value, excluded: &[&str]) -> String {
    match value {
        Value::Object(map) => {
            let filtered: Map<String, Value> = map
                .iter()
                .filter(|(k, _)| !excluded.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            checksum_value(&Value::Object(filtered))
        }
        other => checksum_value(other),
    }
}

/// Checksum of any serializable value's canonical JSON form.
pub fn checksum_of<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(checksum_value(&serde_json::to_value(value)?))
}
