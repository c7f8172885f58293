// hasher.rs — SHA-256 hashing and canonical-JSON utilities.
//
// All hashes in the gateway are SHA-256, hex-encoded. Canonical JSON is
// what the audit log hashes: a serde_json::Value serializes its objects
// as a BTreeMap (no `preserve_order` feature enabled anywhere in this
// workspace), so converting a struct through `serde_json::to_value` and
// back to a string always yields sorted keys with no inserted whitespace.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::AuditError;

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash the contents of a file on disk.
pub fn hash_file(path: &Path) -> Result<String, AuditError> {
    let data = std::fs::read(path).map_err(AuditError::WriteFailed)?;
    Ok(hash_bytes(&data))
}

/// Serialize a value as canonical JSON: object keys sorted, no whitespace.
///
/// This is what `entry_hash` is computed over, so the hash is stable
/// regardless of the order fields were declared or constructed in.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, AuditError> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&v)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_determinism() {
        let input = b"hello world";
        assert_eq!(hash_bytes(input), hash_bytes(input));
    }

    #[test]
    fn hash_uniqueness() {
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn hash_is_hex_encoded_sha256() {
        let hash = hash_str("test");
        assert_eq!(hash.len(), 64);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn hash_known_value() {
        // SHA-256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        assert_eq!(
            hash_str(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn canonical_json_sorts_keys_regardless_of_struct_field_order() {
        #[derive(Serialize)]
        struct A {
            z: u32,
            a: u32,
        }
        let json = canonical_json(&A { z: 1, a: 2 }).unwrap();
        assert_eq!(json, r#"{"a":2,"z":1}"#);
    }

    #[test]
    fn canonical_json_is_deterministic() {
        #[derive(Serialize)]
        struct A {
            b: u32,
            a: u32,
        }
        let v = A { b: 1, a: 2 };
        assert_eq!(canonical_json(&v).unwrap(), canonical_json(&v).unwrap());
    }
}
