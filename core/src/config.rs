//! # Constants & Derivation Configuration
//!
//! Every magic number in keyweave lives here. Algorithm names, key lengths,
//! KDF context strings, the BIP-44 path layout. If you're hardcoding a
//! constant somewhere else, move it here.
//!
//! Changing anything in the "Derivation Layout" or "Session Keys" sections
//! changes every derived key or every session key. Existing identities and
//! stored messages would silently stop matching. Treat those as frozen.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

/// Signature scheme for authentication and assertion keys.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Diffie-Hellman function for key-agreement keys.
pub const KEY_AGREEMENT_ALGORITHM: &str = "X25519";

/// Symmetric cipher for message payloads and at-rest private keys.
pub const SYMMETRIC_ALGORITHM: &str = "AES-256-GCM";

/// Algorithm identifier stamped on every [`EncryptedMessage`](crate::messaging::EncryptedMessage).
///
/// Reads as: X25519 agreement, BLAKE3 session KDF, AES-256-GCM payload.
pub const MESSAGE_ALGORITHM_ID: &str = "X25519-BLAKE3-AES256GCM-v1";

// ---------------------------------------------------------------------------
// Key & Buffer Lengths
// ---------------------------------------------------------------------------

/// Ed25519 secret key (seed) length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Ed25519 public key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// X25519 secret and public key length in bytes.
pub const AGREEMENT_KEY_LENGTH: usize = 32;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length. 96 bits, the only length GCM is specified for
/// without an extra GHASH pass.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// BIP-39 seed length. PBKDF2-HMAC-SHA512 output, 64 bytes.
pub const SEED_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Mnemonics
// ---------------------------------------------------------------------------

/// Word counts accepted by BIP-39 (128 to 256 bits of entropy in 32-bit steps).
pub const SUPPORTED_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// Word count for freshly generated mnemonics. 256 bits of entropy.
pub const DEFAULT_WORD_COUNT: usize = 24;

// ---------------------------------------------------------------------------
// Derivation Layout
// ---------------------------------------------------------------------------

/// BIP-44 purpose level. Every key path starts with `m/44'`.
pub const BIP44_PURPOSE: u32 = 44;

/// Default coin-type level.
pub const DEFAULT_COIN_TYPE: u32 = 0;

/// Default account level.
pub const DEFAULT_ACCOUNT: u32 = 0;

/// Offset marking a hardened child index (BIP-32 / SLIP-0010).
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// HMAC key for the SLIP-0010 Ed25519 master node.
pub const SLIP10_ED25519_SEED_KEY: &[u8] = b"ed25519 seed";

/// Upper bound on SHA-256 re-hash rounds when turning Ed25519 child bytes
/// into a usable X25519 secret. Reaching it means something is very wrong
/// with the hash function, not with the input.
pub const MAX_AGREEMENT_REHASH_ATTEMPTS: u32 = 8;

// ---------------------------------------------------------------------------
// Session Keys
// ---------------------------------------------------------------------------

/// BLAKE3 `derive_key` context for message session keys.
///
/// The algorithm tag is part of the string so a session key can never be
/// confused with a key derived for another purpose.
pub const SESSION_KEY_CONTEXT: &str = "keyweave X25519-BLAKE3-AES256GCM-v1 message session key";

// ---------------------------------------------------------------------------
// DerivationConfig
// ---------------------------------------------------------------------------

/// Errors from configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported mnemonic word count {0}: expected one of 12, 15, 18, 21, 24")]
    UnsupportedWordCount(usize),

    #[error("{level} index {value} does not fit below the hardened offset")]
    IndexOutOfRange {
        /// Which path level was out of range.
        level: &'static str,
        /// The offending value.
        value: u32,
    },
}

/// Tunable parts of the derivation layout.
///
/// Paths are `m/44'/{coin_type}'/{account}'/{usage_branch}'/{index}'`.
/// Two registries built from the same seed but different `coin_type` or
/// `account` never share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DerivationConfig {
    /// BIP-44 coin-type level.
    pub coin_type: u32,
    /// BIP-44 account level.
    pub account: u32,
    /// Word count used when generating a new mnemonic.
    pub word_count: usize,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            coin_type: DEFAULT_COIN_TYPE,
            account: DEFAULT_ACCOUNT,
            word_count: DEFAULT_WORD_COUNT,
        }
    }
}

impl DerivationConfig {
    /// Checks that every level fits a hardened index and the word count is
    /// one BIP-39 knows about.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_WORD_COUNTS.contains(&self.word_count) {
            return Err(ConfigError::UnsupportedWordCount(self.word_count));
        }
        if self.coin_type >= HARDENED_OFFSET {
            return Err(ConfigError::IndexOutOfRange {
                level: "coin type",
                value: self.coin_type,
            });
        }
        if self.account >= HARDENED_OFFSET {
            return Err(ConfigError::IndexOutOfRange {
                level: "account",
                value: self.account,
            });
        }
        Ok(())
    }

    /// Parses a JSON configuration document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DerivationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coin_type, 0);
        assert_eq!(config.account, 0);
        assert_eq!(config.word_count, 24);
    }

    #[test]
    fn test_unsupported_word_count_rejected() {
        let config = DerivationConfig {
            word_count: 13,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnsupportedWordCount(13))
        );
    }

    #[test]
    fn test_hardened_range_enforced() {
        let config = DerivationConfig {
            account: HARDENED_OFFSET,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IndexOutOfRange { level: "account", .. })
        ));
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = DerivationConfig::from_json(r#"{"account": 3}"#).unwrap();
        assert_eq!(config.account, 3);
        assert_eq!(config.coin_type, DEFAULT_COIN_TYPE);
        assert_eq!(config.word_count, DEFAULT_WORD_COUNT);
    }

    #[test]
    fn test_crypto_parameter_sizes() {
        assert_eq!(AES_KEY_LENGTH, 32);
        assert_eq!(AES_NONCE_LENGTH, 12);
        assert_eq!(AES_TAG_LENGTH, 16);
        assert_eq!(SIGNATURE_LENGTH, 2 * VERIFYING_KEY_LENGTH);
        assert_eq!(SEED_LENGTH, 64);
    }

    #[test]
    fn test_session_context_is_algorithm_tagged() {
        assert!(SESSION_KEY_CONTEXT.contains(MESSAGE_ALGORITHM_ID));
    }
}
