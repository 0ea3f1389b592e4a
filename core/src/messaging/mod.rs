//! # Secure Messaging
//!
//! End-to-end encrypted messages between identities, built on their
//! `keyAgreement` keys.
//!
//! - [`cipher`]: X25519 → BLAKE3 → AES-256-GCM, plus the receive-side
//!   failure taxonomy.
//! - [`envelope`]: the JSON envelope and the plain/encrypted body enum.
//!
//! The core neither stores nor transmits messages. Callers persist
//! [`EncryptedMessage`] verbatim and hand it back on the receive path.

pub mod cipher;
pub mod envelope;

pub use cipher::{
    decrypt, decrypt_for, encrypt, open, open_body, seal, DecryptFailure, MessageError,
};
pub use envelope::{EncryptedMessage, MessageBody, OpenedMessage};
