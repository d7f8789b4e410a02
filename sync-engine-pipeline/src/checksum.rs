//! SHA-256 integrity digests over serialized progress state.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Known-answer vector for the self test (SHA-256 of `"abc"`).
const SELF_TEST_INPUT: &[u8] = b"abc";
const SELF_TEST_DIGEST: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Lowercase hex SHA-256 of `bytes`.
    pub fn digest(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Digest of the JSON serialization of `value`.
    ///
    /// Field order follows the struct declaration, so the same value always
    /// produces the same digest.
    pub fn digest_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::digest(&bytes))
    }

    pub fn verify(bytes: &[u8], expected: &str) -> bool {
        Self::digest(bytes).eq_ignore_ascii_case(expected)
    }

    pub fn verify_json<T: Serialize>(value: &T, expected: &str) -> Result<bool, serde_json::Error> {
        Ok(Self::digest_json(value)?.eq_ignore_ascii_case(expected))
    }

    /// Checks the hash primitive against a known answer.
    pub fn self_test() -> bool {
        Self::digest(SELF_TEST_INPUT) == SELF_TEST_DIGEST
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_self_test_passes() {
        assert!(ChecksumVerifier::self_test());
    }

    #[test]
    fn test_digest_detects_single_field_change() {
        let original = json!({"processedCount": 20, "totalCount": 50});
        let tampered = json!({"processedCount": 30, "totalCount": 50});

        let digest = ChecksumVerifier::digest_json(&original).unwrap();
        assert!(ChecksumVerifier::verify_json(&original, &digest).unwrap());
        assert!(!ChecksumVerifier::verify_json(&tampered, &digest).unwrap());
    }

    #[test]
    fn test_verify_accepts_uppercase_hex() {
        let digest = ChecksumVerifier::digest(b"payload").to_uppercase();
        assert!(ChecksumVerifier::verify(b"payload", &digest));
    }
}
