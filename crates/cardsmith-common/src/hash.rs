//! Content hashing utilities.
//!
//! Asset content hashes are SHA-256 digests rendered as lowercase hex. They
//! are recomputed on every export so that archive contents can be audited
//! against the stored assets.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of a byte slice as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for &byte in digest.iter() {
        out.push(char::from_digit(u32::from(byte >> 4), 16).unwrap_or('0'));
        out.push(char::from_digit(u32::from(byte & 0x0F), 16).unwrap_or('0'));
    }
    out
}

/// A stable 32-bit fingerprint of a string (first four digest bytes).
///
/// Used where a small deterministic value is needed, e.g. picking a
/// placeholder colour from a card name.
pub fn fingerprint32(s: &str) -> u32 {
    let digest = Sha256::digest(s.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_empty_digest() {
        assert_eq!(
            sha256_hex(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint32("Ava"), fingerprint32("Ava"));
        assert_ne!(fingerprint32("Ava"), fingerprint32("Bea"));
    }
}
