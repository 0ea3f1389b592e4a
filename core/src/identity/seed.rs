//! # Mnemonics & Seeds
//!
//! BIP-39 on top of the `bip39` crate: entropy from the OS RNG encoded as an
//! English word list with a SHA-256 checksum, and the PBKDF2-HMAC-SHA512
//! stretch from phrase to 64-byte seed.
//!
//! ```text
//! entropy (128..256 bits) ──► words (12..24) ──PBKDF2(2048)──► seed (64 bytes)
//! ```
//!
//! The seed is a pure function of `(phrase, passphrase)`. Same words, same
//! passphrase, same seed, on every machine, forever. That determinism is the
//! only reason regenerating an identity from its mnemonic works.
//!
//! This module never stores a mnemonic anywhere. It hands one back to the
//! caller and forgets it.

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::{SEED_LENGTH, SUPPORTED_WORD_COUNTS};

/// Errors from mnemonic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeedError {
    /// The phrase failed BIP-39 validation: unknown word, wrong word count,
    /// or bad checksum.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("unsupported mnemonic word count {0}: expected 12, 15, 18, 21 or 24")]
    UnsupportedWordCount(usize),
}

// ---------------------------------------------------------------------------
// Mnemonic
// ---------------------------------------------------------------------------

/// A checksum-valid BIP-39 English mnemonic.
///
/// Holding one of these means the phrase already passed validation. The
/// words never show up in `Debug` output.
pub struct Mnemonic {
    inner: bip39::Mnemonic,
}

impl Mnemonic {
    /// The phrase as space-separated words.
    pub fn phrase(&self) -> Zeroizing<String> {
        Zeroizing::new(self.inner.to_string())
    }

    pub fn word_count(&self) -> usize {
        self.inner.word_count()
    }
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mnemonic(<{} words>)", self.word_count())
    }
}

impl std::str::FromStr for Mnemonic {
    type Err = SeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_mnemonic(s)
    }
}

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// The 64-byte BIP-39 seed. Root of every derived key.
///
/// Zeroized on drop. No `Clone`, no `Debug`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; SEED_LENGTH]);

impl Seed {
    /// Wrap a raw seed, e.g. one the caller derived or stored elsewhere.
    pub fn from_bytes(bytes: [u8; SEED_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LENGTH] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Generate a fresh mnemonic with the given number of words.
///
/// Entropy is `word_count * 32 / 3` bits from `OsRng`.
///
/// # Errors
///
/// [`SeedError::UnsupportedWordCount`] unless `word_count` is one of
/// 12, 15, 18, 21 or 24.
pub fn generate_mnemonic(word_count: usize) -> Result<Mnemonic, SeedError> {
    if !SUPPORTED_WORD_COUNTS.contains(&word_count) {
        return Err(SeedError::UnsupportedWordCount(word_count));
    }

    let mut entropy = Zeroizing::new(vec![0u8; word_count * 4 / 3]);
    OsRng.fill_bytes(&mut entropy);

    let inner = bip39::Mnemonic::from_entropy(&entropy)
        .map_err(|e| SeedError::InvalidMnemonic(e.to_string()))?;
    Ok(Mnemonic { inner })
}

/// Parse and checksum-validate a phrase.
///
/// Whitespace is collapsed and words are lowercased before parsing, so
/// `"  Abandon  abandon ..."` is accepted.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, SeedError> {
    let normalized = Zeroizing::new(
        phrase
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" "),
    );

    let inner = bip39::Mnemonic::parse_normalized(&normalized)
        .map_err(|e| SeedError::InvalidMnemonic(e.to_string()))?;
    Ok(Mnemonic { inner })
}

/// `true` if the phrase is a valid BIP-39 English mnemonic. Never panics.
pub fn validate_mnemonic(phrase: &str) -> bool {
    parse_mnemonic(phrase).is_ok()
}

/// Stretch a mnemonic and optional passphrase into the 64-byte seed.
///
/// The passphrase is used as given. Callers accepting non-ASCII passphrases
/// should NFKD-normalize them first.
pub fn derive_seed(mnemonic: &Mnemonic, passphrase: &str) -> Seed {
    Seed(mnemonic.inner.to_seed_normalized(passphrase))
}
