//! # Key Agreement
//!
//! X25519 Diffie-Hellman between two static agreement keys, and the KDF
//! that turns its output into a symmetric session key.
//!
//! ## Symmetry
//!
//! The whole messaging layer rests on one equation:
//!
//! ```text
//! shared_secret(A.priv, B.pub) == shared_secret(B.priv, A.pub)
//! ```
//!
//! The sender computes the left side, the recipient the right. If they
//! ever disagree, nobody can read anything.
//!
//! ## Session keys
//!
//! The raw DH output is never used as a cipher key. It is a curve point
//! encoding, not a uniformly random string. It goes through BLAKE3's
//! `derive_key` mode with a fixed context string that names the algorithm
//! suite, so a key derived here cannot collide with BLAKE3 used for
//! anything else.

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::keys::{AgreementKeypair, AgreementPublicKey};
use crate::config::AES_KEY_LENGTH;

/// Errors in key agreement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgreementError {
    /// The peer key is a low-order point; the DH output would not depend
    /// on our secret at all.
    #[error("key agreement failed: peer public key is not contributory")]
    NonContributory,
}

/// Raw X25519 output. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// SharedSecret does not implement Clone/Debug to prevent leakage.

/// A 256-bit symmetric key for AES-256-GCM. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; AES_KEY_LENGTH]);

impl SessionKey {
    pub fn as_bytes(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.0
    }
}

/// Diffie-Hellman between our agreement keypair and a peer's public key.
///
/// # Errors
///
/// [`AgreementError::NonContributory`] if the peer key is one of the
/// low-order points, which would make the result predictable.
pub fn shared_secret(
    own: &AgreementKeypair,
    other: &AgreementPublicKey,
) -> Result<SharedSecret, AgreementError> {
    let raw = own.diffie_hellman(other);
    if !raw.was_contributory() {
        return Err(AgreementError::NonContributory);
    }
    Ok(SharedSecret(*raw.as_bytes()))
}

/// Derive a session key from a DH shared secret.
///
/// ```text
/// session_key = BLAKE3-derive-key(context, shared_secret)
/// ```
///
/// `context` should be a hardcoded, globally unique string naming the
/// purpose and algorithm suite, e.g. [`crate::config::SESSION_KEY_CONTEXT`].
pub fn derive_session_key(shared: &SharedSecret, context: &str) -> SessionKey {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(shared.as_bytes());
    let mut key = [0u8; AES_KEY_LENGTH];
    hasher.finalize_xof().fill(&mut key);
    SessionKey(key)
}
