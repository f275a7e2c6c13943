//! Canonical JSON serialization for deterministic content hashing.
//!
//! Manifest governance rests on one property: the same logical content
//! always hashes to the same value, regardless of key order or formatting.
//! Canonical JSON here means:
//! - Object keys sorted lexicographically
//! - Compact output (no whitespace)
//! - UTF-8 encoding
//!
//! The content hash is the first 16 hex characters of the SHA-256 digest of
//! the canonical bytes; that width is the store's wire format and must stay
//! stable across releases.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Number of hex characters retained in a content hash.
const CONTENT_HASH_LEN: usize = 16;

/// Serializes `value` into canonical JSON bytes.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the value cannot be represented as
/// JSON.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut json = serde_json::to_value(value).map_err(|e| Error::Serialization {
        message: format!("failed to convert value to JSON: {e}"),
    })?;
    canonicalize_value(&mut json);
    serde_json::to_vec(&json).map_err(|e| Error::Serialization {
        message: format!("failed to serialize canonical JSON: {e}"),
    })
}

/// Computes the content hash of a serializable value.
///
/// Returns the first 16 hex characters of `sha256(canonical_json(value))`.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if canonical serialization fails.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String> {
    let bytes = to_canonical_bytes(value)?;
    let digest = Sha256::digest(&bytes);
    let hex = hex::encode(digest);
    Ok(hex[..CONTENT_HASH_LEN].to_string())
}

/// Computes the full SHA-256 digest of raw bytes, `sha256:`-prefixed.
///
/// Used for artifact-level hashes (raw envelopes, fact payloads) where the
/// full digest is recorded for integrity rather than governance comparison.
#[must_use]
pub fn digest_prefixed(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Recursively sorts object keys for deterministic output.
///
/// Guards against `serde_json` being built with `preserve_order`: the
/// canonical form must not depend on build features.
fn canonicalize_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(mut child) = map.remove(&key) {
                    canonicalize_value(&mut child);
                    sorted.insert(key, child);
                }
            }
            *map = sorted;
        }
        Value::Array(values) => {
            for child in values {
                canonicalize_value(child);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Unordered {
        zebra: u32,
        alpha: u32,
    }

    #[test]
    fn canonical_bytes_sort_keys() {
        let value = Unordered { zebra: 1, alpha: 2 };
        let bytes = to_canonical_bytes(&value).expect("canonical");
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(text, r#"{"alpha":2,"zebra":1}"#);
    }

    #[test]
    fn content_hash_is_deterministic_across_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": 2, "a": {"y": 1, "x": 0}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 0, "y": 1}, "b": 2}"#).unwrap();
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn content_hash_is_sixteen_hex_chars() {
        let hash = content_hash(&serde_json::json!({"k": "v"})).unwrap();
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_content_different_hash() {
        let a = serde_json::json!({"k": "v"});
        let b = serde_json::json!({"k": "w"});
        assert_ne!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn digest_prefixed_format() {
        let d = digest_prefixed(b"hello");
        assert!(d.starts_with("sha256:"));
        assert_eq!(d.len(), "sha256:".len() + 64);
    }
}
