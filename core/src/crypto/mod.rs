//! # Cryptographic Primitives
//!
//! Everything below the identity layer: key types, signatures, key
//! agreement, symmetric encryption and the hashes that glue them together.
//!
//! - **Ed25519** for signatures (`ed25519-dalek`).
//! - **X25519** for Diffie-Hellman (`x25519-dalek`).
//! - **BLAKE3** `derive_key` for session keys.
//! - **AES-256-GCM** for payloads and keys at rest (`aes-gcm`).
//! - **SHA-256 / HMAC-SHA512** for hierarchical derivation (`sha2`, `hmac`).
//!
//! Everything here is a thin, typed wrapper around audited implementations.

pub mod agreement;
pub mod encryption;
pub mod hash;
pub mod keys;
pub mod signatures;

pub use agreement::{derive_session_key, shared_secret, AgreementError, SessionKey, SharedSecret};
pub use keys::{
    AgreementKeypair, AgreementPublicKey, CurveType, KeyError, KeyMaterial, PublicKey, Signature,
    SigningKeypair, SigningPublicKey,
};
pub use signatures::{batch_verify, sign, verify, verify_hex, verify_raw};
