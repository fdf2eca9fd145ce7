//! Blind index generation for equality search over encrypted fields.
//!
//! The surrogate is a deterministic SHA-256 digest, hex-encoded, computed
//! over a normalized representation of the value. It is deliberately
//! unsalted: determinism is what makes equality search and surrogate-layer
//! uniqueness work, and it means identical plaintexts always share a
//! surrogate, across entities and across process restarts. That linkability
//! is a disclosed design property; callers must not index low-entropy
//! values expecting unlinkability.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex length of a surrogate digest (SHA-256).
pub const DIGEST_LEN: usize = 64;

/// Computes the surrogate digest of a string value.
///
/// The string is hashed as-is; normalization (trimming, casing) is the
/// caller's responsibility and must match between write and query.
///
/// # Example
///
/// ```
/// use chartseal::index::digest;
///
/// let first = digest("H001");
/// let second = digest("H001");
/// assert_eq!(first, second);
/// assert_eq!(first.len(), 64);
/// assert_ne!(first, digest("H002"));
/// ```
#[must_use]
pub fn digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Computes the surrogate digest of an arbitrary JSON value.
///
/// Absence is not hashed: `Null` yields `None`. Strings are hashed as-is;
/// every other value is first canonicalized with [`canonical_json`]. The
/// canonicalization is fixed: any variance would break equality search.
#[must_use]
pub fn digest_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(digest(text)),
        other => Some(digest(&canonical_json(other))),
    }
}

/// Renders a JSON value in its canonical textual form.
///
/// Compact separators with object keys in sorted order (the map
/// representation is ordered by key), so the same logical value always
/// produces the same bytes.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// Returns true when a stored string has the shape of a surrogate digest.
///
/// Used to tell an intermediate-generation column (digest written into the
/// plaintext-named column) apart from a true legacy plaintext.
#[must_use]
pub fn is_digest(value: &str) -> bool {
    value.len() == DIGEST_LEN
        && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_digest_deterministic() {
        assert_eq!(digest("alice@example.com"), digest("alice@example.com"));
    }

    #[test]
    fn test_digest_known_vector() {
        // SHA-256("abc"), FIPS 180-2 appendix B.1
        assert_eq!(
            digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_corpus_has_no_collisions() {
        let corpus = ["H001", "H002", "h001", "doctor", "admin", "patient", "", " "];
        let mut seen = std::collections::HashSet::new();
        for value in corpus {
            assert!(seen.insert(digest(value)), "collision for {value:?}");
        }
    }

    #[test]
    fn test_null_is_not_hashed() {
        assert_eq!(digest_value(&Value::Null), None);
    }

    #[test]
    fn test_string_value_hashed_as_is() {
        assert_eq!(digest_value(&json!("H001")), Some(digest("H001")));
        // Not the JSON-quoted form.
        assert_ne!(digest_value(&json!("H001")), Some(digest("\"H001\"")));
    }

    #[test]
    fn test_structured_value_uses_canonical_form() {
        let value = json!({"b": 1, "a": [2, 3]});
        assert_eq!(digest_value(&value), Some(digest(r#"{"a":[2,3],"b":1}"#)));
    }

    #[test]
    fn test_canonical_json_sorts_object_keys() {
        let a: Value = serde_json::from_str(r#"{"z":1,"a":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":2,"z":1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":2,"z":1}"#);
    }

    #[test]
    fn test_is_digest() {
        assert!(is_digest(&digest("H001")));
        assert!(!is_digest("H001"));
        assert!(!is_digest(&"A".repeat(64)));
        assert!(!is_digest(&"a".repeat(63)));
    }
}
