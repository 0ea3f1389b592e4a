//! # Message Cipher
//!
//! End-to-end message encryption between two agreement keys.
//!
//! ```text
//! shared  = X25519(sender.priv, recipient.pub)
//! key     = BLAKE3-derive-key(SESSION_KEY_CONTEXT, shared)
//! aad     = algorithm || sender.pub || recipient.pub
//! sealed  = AES-256-GCM(key, fresh 96-bit iv, plaintext, aad)
//! ```
//!
//! The recipient recomputes `shared` from its own private key and the
//! sender key carried in the envelope. Both public keys are bound into the
//! AAD, so an envelope re-addressed to someone else fails authentication.
//! An envelope may omit the recipient key; the AAD is then rebuilt from
//! the key attempting decryption, and only the true recipient gets past
//! the tag check.
//!
//! Only the authenticated mode exists. An envelope without a tag is
//! refused with [`DecryptFailure::MissingAuthTag`] rather than decrypted
//! without integrity.

use thiserror::Error;
use tracing::{debug, warn};

use super::envelope::{EncryptedMessage, MessageBody, OpenedMessage};
use crate::config::{AES_NONCE_LENGTH, AES_TAG_LENGTH, MESSAGE_ALGORITHM_ID, SESSION_KEY_CONTEXT};
use crate::crypto::agreement::{derive_session_key, shared_secret, AgreementError, SessionKey};
use crate::crypto::encryption::{open_detached, seal_detached, EncryptionError};
use crate::crypto::hash::key_fingerprint;
use crate::crypto::keys::{AgreementKeypair, AgreementPublicKey};
use crate::identity::registry::KeyRegistry;

/// Errors from the message cipher.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// The recipient key can't be used for agreement.
    #[error("cannot encrypt to this recipient: {0}")]
    Agreement(#[from] AgreementError),

    #[error("message encryption failed")]
    EncryptionFailed,

    /// Every receive-side failure ends up here.
    #[error("decryption failed: {0}")]
    DecryptionFailed(DecryptFailure),
}

/// Why a decryption attempt failed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecryptFailure {
    /// A field is missing, not hex, or the wrong length. Names the field.
    #[error("malformed envelope field '{0}'")]
    MalformedEnvelope(&'static str),

    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,

    #[error("envelope has no authentication tag")]
    MissingAuthTag,

    #[error("envelope is missing a counterpart public key")]
    MissingCounterpartKey,

    #[error("message is addressed to a different key")]
    WrongRecipient,

    /// Tag mismatch: wrong key, or the envelope was altered.
    #[error("authentication failed")]
    AuthenticationFailed,
}

fn fail(failure: DecryptFailure) -> MessageError {
    warn!(reason = %failure, "message decryption failed");
    MessageError::DecryptionFailed(failure)
}

fn associated_data(sender: &AgreementPublicKey, recipient: &AgreementPublicKey) -> Vec<u8> {
    let mut aad = Vec::with_capacity(MESSAGE_ALGORITHM_ID.len() + 64);
    aad.extend_from_slice(MESSAGE_ALGORITHM_ID.as_bytes());
    aad.extend_from_slice(sender.as_bytes());
    aad.extend_from_slice(recipient.as_bytes());
    aad
}

/// Encrypt `plaintext` from `sender` to `recipient`.
///
/// # Example
///
/// ```
/// use keyweave_core::crypto::keys::AgreementKeypair;
/// use keyweave_core::messaging::{decrypt, encrypt};
///
/// let alice = AgreementKeypair::generate();
/// let bob = AgreementKeypair::generate();
/// let msg = encrypt(b"see you at noon", &alice, &bob.public_key()).unwrap();
/// assert_eq!(decrypt(&msg, &bob).unwrap(), b"see you at noon");
/// ```
pub fn encrypt(
    plaintext: &[u8],
    sender: &AgreementKeypair,
    recipient: &AgreementPublicKey,
) -> Result<EncryptedMessage, MessageError> {
    let shared = shared_secret(sender, recipient)?;
    let key = derive_session_key(&shared, SESSION_KEY_CONTEXT);
    seal(plaintext, &key, &sender.public_key(), recipient)
}

/// Encrypt under an already-derived session key. A fresh IV is drawn on
/// every call.
pub fn seal(
    plaintext: &[u8],
    key: &SessionKey,
    sender: &AgreementPublicKey,
    recipient: &AgreementPublicKey,
) -> Result<EncryptedMessage, MessageError> {
    let aad = associated_data(sender, recipient);
    let sealed = seal_detached(key.as_bytes(), plaintext, &aad)
        .map_err(|_| MessageError::EncryptionFailed)?;

    debug!(
        sender = %key_fingerprint(sender.as_bytes()),
        recipient = %key_fingerprint(recipient.as_bytes()),
        bytes = plaintext.len(),
        "message sealed"
    );

    Ok(EncryptedMessage {
        ciphertext: hex::encode(&sealed.ciphertext),
        iv: hex::encode(sealed.nonce),
        auth_tag: Some(hex::encode(sealed.tag)),
        sender_public_key: sender.to_hex(),
        recipient_public_key: Some(recipient.to_hex()),
        algorithm: MESSAGE_ALGORITHM_ID.to_string(),
    })
}

/// Decrypt a message addressed to `recipient`.
pub fn decrypt(
    message: &EncryptedMessage,
    recipient: &AgreementKeypair,
) -> Result<Vec<u8>, MessageError> {
    ParsedEnvelope::parse(message)
        .and_then(|parsed| parsed.decrypt(recipient))
        .map_err(fail)
}

/// Decrypt under an already-derived session key. The envelope must name
/// its recipient, since nothing else supplies that half of the AAD.
pub fn open(message: &EncryptedMessage, key: &SessionKey) -> Result<Vec<u8>, MessageError> {
    let parsed = ParsedEnvelope::parse(message).map_err(fail)?;
    let recipient = parsed
        .recipient
        .as_ref()
        .ok_or_else(|| fail(DecryptFailure::MissingCounterpartKey))?;
    parsed.open(key, recipient).map_err(fail)
}

/// Decrypt with whichever agreement key in `registry` the message is
/// addressed to. Deactivated keys still decrypt.
///
/// An envelope without a recipient key is tried against every agreement
/// key in turn.
pub fn decrypt_for(
    registry: &KeyRegistry,
    message: &EncryptedMessage,
) -> Result<Vec<u8>, MessageError> {
    let parsed = ParsedEnvelope::parse(message).map_err(fail)?;
    let mut candidates = registry
        .records()
        .iter()
        .filter_map(|r| r.material().as_agreement());

    match parsed.recipient {
        Some(ref addressed) => {
            let keypair = candidates
                .find(|kp| kp.public_key() == *addressed)
                .ok_or_else(|| fail(DecryptFailure::WrongRecipient))?;
            parsed.decrypt(keypair).map_err(fail)
        }
        None => {
            let mut last = DecryptFailure::WrongRecipient;
            for keypair in candidates {
                match parsed.decrypt(keypair) {
                    Ok(plaintext) => return Ok(plaintext),
                    Err(DecryptFailure::AuthenticationFailed) => {
                        last = DecryptFailure::AuthenticationFailed
                    }
                    Err(other) => return Err(fail(other)),
                }
            }
            Err(fail(last))
        }
    }
}

/// Open a stored body. Plain bodies pass through untouched; encrypted ones
/// are decrypted for `recipient`.
pub fn open_body(
    body: &MessageBody,
    recipient: &AgreementKeypair,
) -> Result<OpenedMessage, MessageError> {
    match body {
        MessageBody::Plain { content } => Ok(OpenedMessage::Passthrough(content.as_bytes().to_vec())),
        MessageBody::Encrypted(message) => decrypt(message, recipient).map(OpenedMessage::Decrypted),
    }
}

/// An envelope with every field decoded and length-checked.
struct ParsedEnvelope {
    ciphertext: Vec<u8>,
    iv: Vec<u8>,
    tag: Vec<u8>,
    sender: AgreementPublicKey,
    recipient: Option<AgreementPublicKey>,
}

impl ParsedEnvelope {
    fn parse(message: &EncryptedMessage) -> Result<Self, DecryptFailure> {
        if message.algorithm != MESSAGE_ALGORITHM_ID {
            return Err(DecryptFailure::UnsupportedAlgorithm);
        }
        let tag = message
            .auth_tag
            .as_deref()
            .ok_or(DecryptFailure::MissingAuthTag)?;
        if message.sender_public_key.is_empty() {
            return Err(DecryptFailure::MissingCounterpartKey);
        }

        let decode = |field: &'static str, value: &str| {
            hex::decode(value).map_err(|_| DecryptFailure::MalformedEnvelope(field))
        };
        let key = |field: &'static str, value: &str| {
            AgreementPublicKey::from_hex(value).map_err(|_| DecryptFailure::MalformedEnvelope(field))
        };

        let iv = decode("iv", &message.iv)?;
        if iv.len() != AES_NONCE_LENGTH {
            return Err(DecryptFailure::MalformedEnvelope("iv"));
        }
        let tag = decode("authTag", tag)?;
        if tag.len() != AES_TAG_LENGTH {
            return Err(DecryptFailure::MalformedEnvelope("authTag"));
        }
        let recipient = match message.recipient_public_key.as_deref() {
            Some(k) if !k.is_empty() => Some(key("recipientPublicKey", k)?),
            _ => None,
        };

        Ok(Self {
            ciphertext: decode("ciphertext", &message.ciphertext)?,
            iv,
            tag,
            sender: key("senderPublicKey", &message.sender_public_key)?,
            recipient,
        })
    }

    fn decrypt(&self, recipient: &AgreementKeypair) -> Result<Vec<u8>, DecryptFailure> {
        let own = recipient.public_key();
        if self.recipient.as_ref().is_some_and(|addressed| *addressed != own) {
            return Err(DecryptFailure::WrongRecipient);
        }
        let shared = shared_secret(recipient, &self.sender)
            .map_err(|_| DecryptFailure::MalformedEnvelope("senderPublicKey"))?;
        let key = derive_session_key(&shared, SESSION_KEY_CONTEXT);
        self.open(&key, &own)
    }

    fn open(&self, key: &SessionKey, recipient: &AgreementPublicKey) -> Result<Vec<u8>, DecryptFailure> {
        let aad = associated_data(&self.sender, recipient);
        open_detached(key.as_bytes(), &self.iv, &self.ciphertext, &self.tag, &aad).map_err(|e| match e {
            EncryptionError::InvalidNonceLength => DecryptFailure::MalformedEnvelope("iv"),
            EncryptionError::InvalidTagLength => DecryptFailure::MalformedEnvelope("authTag"),
            _ => DecryptFailure::AuthenticationFailed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DerivationConfig;
    use crate::crypto::keys::CurveType;
    use crate::identity::registry::KeyUsage;
    use crate::identity::seed::{derive_seed, generate_mnemonic};

    fn pair() -> (AgreementKeypair, AgreementKeypair) {
        (AgreementKeypair::generate(), AgreementKeypair::generate())
    }

    fn failure(result: Result<Vec<u8>, MessageError>) -> DecryptFailure {
        match result {
            Err(MessageError::DecryptionFailed(f)) => f,
            other => panic!("expected decryption failure, got {other:?}"),
        }
    }

    #[test]
    fn test_roundtrip() {
        let (alice, bob) = pair();
        let msg = encrypt(b"hello bob", &alice, &bob.public_key()).unwrap();
        assert_eq!(msg.algorithm, MESSAGE_ALGORITHM_ID);
        assert_eq!(msg.sender_public_key, alice.public_key().to_hex());
        assert_eq!(decrypt(&msg, &bob).unwrap(), b"hello bob");
    }

    #[test]
    fn test_roundtrip_both_directions_and_sizes() {
        let (alice, bob) = pair();
        for size in [0usize, 1, 15, 16, 17, 1024, 65_537] {
            let plaintext = vec![0x5a; size];
            let to_bob = encrypt(&plaintext, &alice, &bob.public_key()).unwrap();
            let to_alice = encrypt(&plaintext, &bob, &alice.public_key()).unwrap();
            assert_eq!(decrypt(&to_bob, &bob).unwrap(), plaintext);
            assert_eq!(decrypt(&to_alice, &alice).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_iv_every_call() {
        let (alice, bob) = pair();
        let a = encrypt(b"same", &alice, &bob.public_key()).unwrap();
        let b = encrypt(b"same", &alice, &bob.public_key()).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_seal_and_open_with_session_key() {
        let (alice, bob) = pair();
        let key = derive_session_key(
            &shared_secret(&alice, &bob.public_key()).unwrap(),
            SESSION_KEY_CONTEXT,
        );
        let msg = seal(b"direct", &key, &alice.public_key(), &bob.public_key()).unwrap();
        assert_eq!(open(&msg, &key).unwrap(), b"direct");
        assert_eq!(decrypt(&msg, &bob).unwrap(), b"direct");
    }

    #[test]
    fn test_tampering_fails_authentication() {
        let (alice, bob) = pair();
        let msg = encrypt(b"integrity matters", &alice, &bob.public_key()).unwrap();

        let mut ct = msg.clone();
        let mut bytes = hex::decode(&ct.ciphertext).unwrap();
        bytes[0] ^= 1;
        ct.ciphertext = hex::encode(bytes);
        assert_eq!(failure(decrypt(&ct, &bob)), DecryptFailure::AuthenticationFailed);

        let mut tag = msg.clone();
        tag.auth_tag = Some("00".repeat(16));
        assert_eq!(failure(decrypt(&tag, &bob)), DecryptFailure::AuthenticationFailed);

        let mut iv = msg.clone();
        iv.iv = "ff".repeat(12);
        assert_eq!(failure(decrypt(&iv, &bob)), DecryptFailure::AuthenticationFailed);
    }

    #[test]
    fn test_spoofed_sender_fails() {
        let (alice, bob) = pair();
        let mallory = AgreementKeypair::generate();
        let mut msg = encrypt(b"from alice", &alice, &bob.public_key()).unwrap();
        msg.sender_public_key = mallory.public_key().to_hex();
        assert_eq!(failure(decrypt(&msg, &bob)), DecryptFailure::AuthenticationFailed);
    }

    #[test]
    fn test_wrong_recipient() {
        let (alice, bob) = pair();
        let eve = AgreementKeypair::generate();
        let msg = encrypt(b"for bob", &alice, &bob.public_key()).unwrap();
        assert_eq!(failure(decrypt(&msg, &eve)), DecryptFailure::WrongRecipient);

        // Re-addressing the envelope to eve doesn't help: the AAD still
        // names bob.
        let mut readdressed = msg.clone();
        readdressed.recipient_public_key = Some(eve.public_key().to_hex());
        assert_eq!(
            failure(decrypt(&readdressed, &eve)),
            DecryptFailure::AuthenticationFailed
        );
    }

    #[test]
    fn test_missing_fields() {
        let (alice, bob) = pair();
        let msg = encrypt(b"x", &alice, &bob.public_key()).unwrap();

        let mut no_tag = msg.clone();
        no_tag.auth_tag = None;
        assert_eq!(failure(decrypt(&no_tag, &bob)), DecryptFailure::MissingAuthTag);

        let mut no_sender = msg.clone();
        no_sender.sender_public_key = String::new();
        assert_eq!(
            failure(decrypt(&no_sender, &bob)),
            DecryptFailure::MissingCounterpartKey
        );
    }

    #[test]
    fn test_envelope_without_recipient_key() {
        let (alice, bob) = pair();
        let eve = AgreementKeypair::generate();
        let mut msg = encrypt(b"unaddressed", &alice, &bob.public_key()).unwrap();
        msg.recipient_public_key = None;

        assert_eq!(decrypt(&msg, &bob).unwrap(), b"unaddressed");
        assert_eq!(failure(decrypt(&msg, &eve)), DecryptFailure::AuthenticationFailed);

        msg.recipient_public_key = Some(String::new());
        assert_eq!(decrypt(&msg, &bob).unwrap(), b"unaddressed");

        // A bare session key has no recipient to put in the AAD.
        let key = derive_session_key(
            &shared_secret(&alice, &bob.public_key()).unwrap(),
            SESSION_KEY_CONTEXT,
        );
        assert_eq!(failure(open(&msg, &key)), DecryptFailure::MissingCounterpartKey);
    }

    #[test]
    fn test_registry_tries_every_key_for_unaddressed_envelope() {
        let config = DerivationConfig::default();
        let alice = AgreementKeypair::generate();
        let mut bob = KeyRegistry::new(derive_seed(&generate_mnemonic(12).unwrap(), ""), config).unwrap();
        bob.add_key(KeyUsage::Authentication, CurveType::Signing, "login").unwrap();
        bob.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "old").unwrap();
        let inbox = bob
            .add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "inbox")
            .unwrap()
            .material()
            .as_agreement()
            .unwrap()
            .public_key();

        let mut msg = encrypt(b"somewhere in here", &alice, &inbox).unwrap();
        msg.recipient_public_key = None;
        assert_eq!(decrypt_for(&bob, &msg).unwrap(), b"somewhere in here");

        let mut carol = KeyRegistry::new(derive_seed(&generate_mnemonic(12).unwrap(), ""), config).unwrap();
        assert_eq!(failure(decrypt_for(&carol, &msg)), DecryptFailure::WrongRecipient);
        carol.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "inbox").unwrap();
        assert_eq!(failure(decrypt_for(&carol, &msg)), DecryptFailure::AuthenticationFailed);
    }

    #[test]
    fn test_malformed_fields() {
        let (alice, bob) = pair();
        let msg = encrypt(b"x", &alice, &bob.public_key()).unwrap();

        let mut bad_hex = msg.clone();
        bad_hex.ciphertext = "zz".into();
        assert_eq!(
            failure(decrypt(&bad_hex, &bob)),
            DecryptFailure::MalformedEnvelope("ciphertext")
        );

        let mut short_iv = msg.clone();
        short_iv.iv = "00".repeat(8);
        assert_eq!(failure(decrypt(&short_iv, &bob)), DecryptFailure::MalformedEnvelope("iv"));

        let mut short_tag = msg.clone();
        short_tag.auth_tag = Some("00".repeat(4));
        assert_eq!(
            failure(decrypt(&short_tag, &bob)),
            DecryptFailure::MalformedEnvelope("authTag")
        );

        let mut zero_sender = msg.clone();
        zero_sender.sender_public_key = "00".repeat(32);
        assert_eq!(
            failure(decrypt(&zero_sender, &bob)),
            DecryptFailure::MalformedEnvelope("senderPublicKey")
        );
    }

    #[test]
    fn test_unsupported_algorithm() {
        let (alice, bob) = pair();
        let mut msg = encrypt(b"x", &alice, &bob.public_key()).unwrap();
        msg.algorithm = "AES-256-CBC".into();
        assert_eq!(failure(decrypt(&msg, &bob)), DecryptFailure::UnsupportedAlgorithm);
    }

    #[test]
    fn test_low_order_recipient_rejected_on_send() {
        let alice = AgreementKeypair::generate();
        let zero = AgreementPublicKey::from_bytes([0u8; 32]);
        assert_eq!(
            encrypt(b"x", &alice, &zero).unwrap_err(),
            MessageError::Agreement(AgreementError::NonContributory)
        );
    }

    #[test]
    fn test_open_body_distinguishes_outcomes() {
        let (alice, bob) = pair();
        let plain = MessageBody::Plain {
            content: "not secret".into(),
        };
        let opened = open_body(&plain, &bob).unwrap();
        assert!(!opened.was_encrypted());
        assert_eq!(opened.as_bytes(), b"not secret");

        let sealed = MessageBody::Encrypted(encrypt(b"secret", &alice, &bob.public_key()).unwrap());
        let opened = open_body(&sealed, &bob).unwrap();
        assert!(opened.was_encrypted());
        assert_eq!(opened.into_bytes(), b"secret");

        let eve = AgreementKeypair::generate();
        assert!(matches!(
            open_body(&sealed, &eve),
            Err(MessageError::DecryptionFailed(DecryptFailure::WrongRecipient))
        ));
    }

    #[test]
    fn test_registry_derived_keys() {
        let config = DerivationConfig::default();
        let mut alice = KeyRegistry::new(derive_seed(&generate_mnemonic(12).unwrap(), ""), config).unwrap();
        let mut bob = KeyRegistry::new(derive_seed(&generate_mnemonic(12).unwrap(), ""), config).unwrap();
        alice.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "inbox").unwrap();
        bob.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "old").unwrap();
        let bob_inbox = bob
            .add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "inbox")
            .unwrap()
            .material()
            .as_agreement()
            .unwrap()
            .public_key();

        let alice_kp = alice.records()[0].material().as_agreement().unwrap();
        let msg = encrypt(b"via registry", alice_kp, &bob_inbox).unwrap();
        assert_eq!(decrypt_for(&bob, &msg).unwrap(), b"via registry");
        assert!(matches!(
            decrypt_for(&alice, &msg),
            Err(MessageError::DecryptionFailed(DecryptFailure::WrongRecipient))
        ));
    }
}
