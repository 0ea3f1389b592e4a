//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for two jobs: message payloads (detached form,
//! see [`seal_detached`]) and private keys at rest (packed form, see
//! [`encrypt_with_aad`]).
//!
//! ## Nonce management
//!
//! GCM is unforgiving about nonce reuse. Two messages under the same key and
//! nonce leak the XOR of their plaintexts and let an attacker forge tags.
//! Every call here draws a fresh 96-bit nonce from `OsRng`. There is no API
//! that accepts a caller-chosen nonce for encryption.
//!
//! ## Wire formats
//!
//! - Packed: `nonce (12) || ciphertext || tag (16)` in one buffer.
//! - Detached: nonce, ciphertext and tag as three separate buffers, which is
//!   what [`crate::messaging::EncryptedMessage`] stores.

use aes_gcm::{
    aead::{Aead, AeadInPlace, KeyInit, Payload},
    Aes256Gcm, Nonce, Tag,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH};

/// Errors that can occur during encryption/decryption.
///
/// "Wrong key" and "corrupted ciphertext" are the same variant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid nonce length: expected {AES_NONCE_LENGTH} bytes")]
    InvalidNonceLength,

    #[error("invalid tag length: expected {AES_TAG_LENGTH} bytes")]
    InvalidTagLength,

    #[error("ciphertext too short: must be at least {} bytes", AES_NONCE_LENGTH + AES_TAG_LENGTH)]
    CiphertextTooShort,
}

/// Output of [`seal_detached`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedCiphertext {
    pub nonce: [u8; AES_NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; AES_TAG_LENGTH],
}

fn random_nonce() -> [u8; AES_NONCE_LENGTH] {
    let mut nonce = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt with associated data, returning `nonce || ciphertext || tag`.
///
/// The AAD is authenticated but not encrypted. The same AAD must be
/// supplied to [`decrypt_with_aad`].
pub fn encrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;
    let nonce_bytes = random_nonce();

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a buffer produced by [`encrypt_with_aad`].
pub fn decrypt_with_aad(
    key: &[u8; AES_KEY_LENGTH],
    data: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH + AES_TAG_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }
    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}

/// Encrypt with associated data, keeping nonce, ciphertext and tag apart.
pub fn seal_detached(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<DetachedCiphertext, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;
    let nonce = random_nonce();

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer)
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut tag_bytes = [0u8; AES_TAG_LENGTH];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(DetachedCiphertext {
        nonce,
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Decrypt detached parts. Nonce and tag lengths are checked before they
/// reach the cipher, so malformed input is an error rather than a panic.
pub fn open_detached(
    key: &[u8; AES_KEY_LENGTH],
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    if nonce.len() != AES_NONCE_LENGTH {
        return Err(EncryptionError::InvalidNonceLength);
    }
    if tag.len() != AES_TAG_LENGTH {
        return Err(EncryptionError::InvalidTagLength);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            aad,
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| EncryptionError::DecryptFailed)?;
    Ok(buffer)
}
