//! Content digests.
//!
//! Task digest = SHA-256 hex digest of JCS(input description), using the
//! RFC 8785 JSON Canonicalization Scheme so that key order, whitespace and
//! number spelling (`500` vs `500.0`) never change the result.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use mvd_model::InputDescription;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_LEN: usize = 64;

/// Compute the canonical digest of an input description.
pub fn digest(input: &InputDescription) -> Result<String, StoreError> {
    digest_serializable(input.as_value())
}

/// Compute the canonical digest of any serializable value.
pub fn digest_serializable<T: Serialize>(value: &T) -> Result<String, StoreError> {
    let jcs_bytes = serde_json_canonicalizer::to_vec(value)
        .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
    Ok(digest_bytes(&jcs_bytes))
}

/// Compute SHA-256 of bytes and return hex string
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Stream a file through SHA-256.
pub fn digest_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Whether `s` looks like a digest produced by this module.
pub fn is_digest(s: &str) -> bool {
    s.len() == DIGEST_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_digest_bytes_known_value() {
        assert_eq!(
            digest_bytes(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_digest_deterministic() {
        let a = InputDescription::new(json!({"code": "vasp", "incar": {"ENCUT": 500}}));
        let b = InputDescription::new(json!({"code": "vasp", "incar": {"ENCUT": 500}}));
        let d1 = digest(&a).unwrap();
        assert_eq!(d1, digest(&b).unwrap());
        assert_eq!(d1, digest(&a).unwrap());
        assert!(is_digest(&d1));
    }

    #[test]
    fn test_digest_ignores_key_order() {
        let a: serde_json::Value =
            serde_json::from_str(r#"{"composition":"Fe2O3","incar":{"ENCUT":500,"ISMEAR":0}}"#)
                .unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"incar":{"ISMEAR":0,"ENCUT":500},"composition":"Fe2O3"}"#)
                .unwrap();
        assert_eq!(
            digest(&InputDescription::new(a)).unwrap(),
            digest(&InputDescription::new(b)).unwrap()
        );
    }

    #[test]
    fn test_digest_number_spelling() {
        let a = InputDescription::new(json!({"ENCUT": 500}));
        let b = InputDescription::new(json!({"ENCUT": 500.0}));
        assert_eq!(digest(&a).unwrap(), digest(&b).unwrap());
    }

    #[test]
    fn test_digest_changes_with_input() {
        let a = InputDescription::new(json!({"incar": {"ENCUT": 500}}));
        let b = InputDescription::new(json!({"incar": {"ENCUT": 520}}));
        assert_ne!(digest(&a).unwrap(), digest(&b).unwrap());
    }

    #[test]
    fn test_digest_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("OUTCAR");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(digest_file(&path).unwrap(), digest_bytes(b"hello"));
    }

    #[test]
    fn test_is_digest() {
        assert!(is_digest(&digest_bytes(b"x")));
        assert!(!is_digest("abc"));
        assert!(!is_digest(&digest_bytes(b"x").to_uppercase()));
        assert!(!is_digest(".staging-01hv3q8zk1234567890abcdefghijklmnopqrstuvwxyz01234567"));
    }
}
