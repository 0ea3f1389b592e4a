//! Wire types for messages: the encrypted envelope, and the body enum that
//! lets a store hold plain and encrypted messages side by side.

use serde::{Deserialize, Serialize};

use super::cipher::{DecryptFailure, MessageError};

/// An encrypted message as persisted and transmitted. Binary fields are
/// lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    pub ciphertext: String,

    /// 96-bit GCM nonce.
    pub iv: String,

    /// 128-bit GCM tag. Always present on messages sealed here; an envelope
    /// without one is refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_tag: Option<String>,

    /// X25519 public key of the sender. The recipient needs it to recompute
    /// the shared secret.
    pub sender_public_key: String,

    /// Hex X25519 key. When absent, decryption binds the AAD to whichever
    /// key is attempting it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_public_key: Option<String>,

    /// Algorithm suite, e.g. `X25519-BLAKE3-AES256GCM-v1`.
    pub algorithm: String,
}

impl EncryptedMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a stored envelope. Anything that isn't one is
    /// [`DecryptFailure::MalformedEnvelope`], not a bare parse error.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        serde_json::from_str(json)
            .map_err(|_| MessageError::DecryptionFailed(DecryptFailure::MalformedEnvelope("json")))
    }
}

/// A stored message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MessageBody {
    /// Never encrypted.
    Plain { content: String },
    Encrypted(EncryptedMessage),
}

impl MessageBody {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, MessageBody::Encrypted(_))
    }
}

/// Result of [`open_body`](super::cipher::open_body). Keeps "there was
/// nothing to decrypt" apart from "decryption worked".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenedMessage {
    Passthrough(Vec<u8>),
    Decrypted(Vec<u8>),
}

impl OpenedMessage {
    pub fn was_encrypted(&self) -> bool {
        matches!(self, OpenedMessage::Decrypted(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            OpenedMessage::Passthrough(b) | OpenedMessage::Decrypted(b) => b,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            OpenedMessage::Passthrough(b) | OpenedMessage::Decrypted(b) => b,
        }
    }
}
