//! # Digital Signatures
//!
//! Ed25519 signing and verification for authentication and assertion keys.
//!
//! Verification in this module is a *total predicate*: every function
//! returns `bool`, and anything that isn't a valid signature by the given
//! key over the given message is `false`. Wrong length, bad hex, a public
//! key that isn't on the curve, a signature from someone else. All `false`,
//! never an error, never a panic. Callers can drop these straight into an
//! `if`.
//!
//! ## Strictness
//!
//! Verification uses `ed25519-dalek`'s `verify_strict`, which rejects
//! small-order public keys and non-canonical `R` components. Signatures
//! produced by this crate always pass it.

use ed25519_dalek::VerifyingKey;

use super::keys::{Signature, SigningKeypair, SigningPublicKey};
use crate::config::{SIGNATURE_LENGTH, VERIFYING_KEY_LENGTH};

/// Sign a message with an Ed25519 keypair.
///
/// # Example
///
/// ```
/// use keyweave_core::crypto::keys::SigningKeypair;
/// use keyweave_core::crypto::signatures::{sign, verify};
///
/// let keypair = SigningKeypair::generate();
/// let signature = sign(&keypair, b"login challenge 8812");
/// assert!(verify(&keypair.public_key(), b"login challenge 8812", &signature));
/// ```
pub fn sign(keypair: &SigningKeypair, message: &[u8]) -> Signature {
    keypair.sign(message)
}

/// Verify a signature against a public key and message.
pub fn verify(public_key: &SigningPublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature)
}

/// Verify from raw byte slices of any length.
///
/// The "bytes off the wire" variant. Lengths are checked here rather than
/// by the caller, so a 31-byte key or a 65-byte signature is just `false`.
pub fn verify_raw(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(pk_bytes) = <[u8; VERIFYING_KEY_LENGTH]>::try_from(public_key) else {
        return false;
    };
    if signature.len() != SIGNATURE_LENGTH {
        return false;
    }
    let Ok(verifying_key) = VerifyingKey::from_bytes(&pk_bytes) else {
        return false;
    };
    let Some(sig) = Signature::from_slice(signature).to_dalek_signature() else {
        return false;
    };
    verifying_key.verify_strict(message, &sig).is_ok()
}

/// Verify from hex-encoded public key and signature.
pub fn verify_hex(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let (Ok(pk), Ok(sig)) = (
        hex::decode(public_key_hex.trim()),
        hex::decode(signature_hex.trim()),
    ) else {
        return false;
    };
    verify_raw(&pk, message, &sig)
}

/// Verify several `(key, message, signature)` triples. `true` only if all of
/// them verify; an empty batch is vacuously `true`.
///
/// Sequential under the hood. If you need to know *which* one failed,
/// verify them one at a time.
pub fn batch_verify(items: &[(SigningPublicKey, Vec<u8>, Signature)]) -> bool {
    items
        .iter()
        .all(|(pubkey, message, signature)| verify(pubkey, message, signature))
}
