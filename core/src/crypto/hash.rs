//! # Hashing
//!
//! The three hashes the core needs, in one place:
//!
//! - **SHA-256**: the one-way step that turns Ed25519 child bytes into an
//!   X25519 secret during derivation.
//! - **HMAC-SHA512**: the SLIP-0010 node function.
//! - **BLAKE3**: short public-key fingerprints for log lines.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

type HmacSha512 = Hmac<Sha512>;

/// Compute SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Compute HMAC-SHA512.
///
/// HMAC takes keys of any length, so the error branch is unreachable in
/// practice.
pub fn hmac_sha512(key: &[u8], data: &[u8]) -> Result<[u8; 64], InvalidLength> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(key)?;
    mac.update(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Short, log-safe fingerprint of a public key: first 8 bytes of its
/// BLAKE3 hash, hex-encoded.
///
/// Lets log lines tell keys apart without printing them.
pub fn key_fingerprint(public_key: &[u8]) -> String {
    let hash = blake3::hash(public_key);
    hex::encode(&hash.as_bytes()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hmac_sha512_rfc4231_case_2() {
        let out = hmac_sha512(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(out),
            "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea250554\
             9758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
        );
    }

    #[test]
    fn test_fingerprint_is_short_and_stable() {
        let fp1 = key_fingerprint(&[1u8; 32]);
        let fp2 = key_fingerprint(&[1u8; 32]);
        assert_eq!(fp1, fp2);
        assert_eq!(fp1.len(), 16);
        assert_ne!(fp1, key_fingerprint(&[2u8; 32]));
    }
}
