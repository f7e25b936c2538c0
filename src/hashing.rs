//! Hashing - SHA-256 over canonical JSON
//!
//! Two requests that compile to the same configuration get the same
//! `config_hash`, regardless of key order in the input.

use sha2::{Sha256, Digest};
use serde::Serialize;
use serde_json::{Value, to_string};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sort_value(v))).collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// config_hash = sha256(canonical_config + ":" + engine_version)
pub fn compute_config_hash<T: Serialize>(config: &T, engine_version: &str) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(config)?;
    Ok(sha256_hex(format!("{canonical}:{engine_version}").as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}
