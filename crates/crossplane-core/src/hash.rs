//! Deterministic hashing of a Composition's spec for revisioning.
//!
//! Hashing is always done over a canonicalised form: sorted map keys,
//! defaulted/null fields stripped, no server-set metadata included, so that
//! two specs which differ only in incidental representation still hash
//! identically.
//!
//! `serde_json::Map` here is backed by a `BTreeMap` (the `preserve_order`
//! feature is not enabled anywhere in this workspace), so `serde_json::Value`
//! objects already serialize with keys in sorted order. Canonicalisation is
//! therefore just: serialize to `Value`, strip `null`s (which are how
//! `#[serde(default)]`/`Option::None` fields round-trip), and serialize to a
//! compact string.

use serde::Serialize;
use serde_json::Value as Json;
use sha2::{Digest, Sha256};

/// Recursively drop `null` object values and empty arrays produced by
/// `#[serde(default)]` fields, so two specs that differ only in whether an
/// optional field was explicitly set to its zero value hash identically.
fn canonicalize(value: Json) -> Json {
    match value {
        Json::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                let v = canonicalize(v);
                if let Json::Array(ref a) = v {
                    if a.is_empty() {
                        continue;
                    }
                }
                out.insert(k, v);
            }
            Json::Object(out)
        }
        Json::Array(items) => Json::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Render a value to its canonical JSON string.
pub fn canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let raw = serde_json::to_value(value)?;
    let canon = canonicalize(raw);
    serde_json::to_string(&canon)
}

/// Compute the content hash used to key a `CompositionRevision`.
///
/// spec.md §8 invariant 1: equal specs always hash identically.
pub fn spec_hash<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let canon = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canon.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// First 7 hex characters of a hash, used in revision names.
pub fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(7)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(spec_hash(&a).unwrap(), spec_hash(&b).unwrap());
    }

    #[test]
    fn null_fields_do_not_affect_hash() {
        let a = json!({"a": 1, "b": null});
        let b = json!({"a": 1});
        assert_eq!(spec_hash(&a).unwrap(), spec_hash(&b).unwrap());
    }

    #[test]
    fn different_content_hashes_differently() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(spec_hash(&a).unwrap(), spec_hash(&b).unwrap());
    }

    #[test]
    fn short_hash_is_first_seven_chars() {
        let h = spec_hash(&json!({"a": 1})).unwrap();
        assert_eq!(short_hash(&h).len(), 7);
        assert!(h.starts_with(short_hash(&h)));
    }
}
