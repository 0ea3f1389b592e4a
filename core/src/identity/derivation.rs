//! # Hierarchical Key Derivation
//!
//! SLIP-0010 over Ed25519, hardened steps only.
//!
//! ```text
//! I        = HMAC-SHA512("ed25519 seed", seed)
//! k, c     = I[..32], I[32..]
//! child(i) = HMAC-SHA512(c, 0x00 || k || ser32(i | 0x8000_0000))
//! ```
//!
//! Ed25519 has no public-key arithmetic that would make normal (non-hardened)
//! children meaningful, so a path containing one is rejected rather than
//! silently hardened.
//!
//! ## Agreement keys
//!
//! The tree is only defined over Ed25519. X25519 keys are produced by
//! hashing the Ed25519 child bytes with SHA-256 and using the digest as the
//! X25519 static secret. This is **not** the birational Edwards→Montgomery
//! map; an X25519 key derived here has no relationship to the Ed25519 key
//! at the same path. Consumers of published documents depend on this exact
//! mapping, so it stays.
//!
//! If a candidate secret ever yields the all-zero public key, the candidate
//! is hashed again, up to [`MAX_AGREEMENT_REHASH_ATTEMPTS`] rounds. Same
//! path, same rounds, same key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::registry::KeyUsage;
use super::seed::Seed;
use crate::config::{
    DerivationConfig, BIP44_PURPOSE, HARDENED_OFFSET, MAX_AGREEMENT_REHASH_ATTEMPTS,
    SLIP10_ED25519_SEED_KEY,
};
use crate::crypto::hash::{hmac_sha512, key_fingerprint, sha256};
use crate::crypto::keys::{AgreementKeypair, CurveType, KeyMaterial, SigningKeypair};

/// Errors that can occur while walking a derivation path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DerivationError {
    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("derivation path has no steps")]
    EmptyPath,

    /// Ed25519 SLIP-0010 only defines hardened children.
    #[error("step {position} ({index}) is not hardened; ed25519 derivation requires hardened steps")]
    NonHardenedStep { position: usize, index: u32 },

    #[error("child index {0} does not fit below the hardened offset")]
    IndexOutOfRange(u32),

    #[error("no valid agreement scalar after {attempts} re-hash rounds")]
    InvalidScalar { attempts: u32 },

    #[error("HMAC key rejected")]
    Hmac,
}

// ---------------------------------------------------------------------------
// ChildIndex
// ---------------------------------------------------------------------------

/// One step of a derivation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildIndex {
    Hardened(u32),
    Normal(u32),
}

impl ChildIndex {
    /// The index without the hardened bit.
    pub fn value(self) -> u32 {
        match self {
            ChildIndex::Hardened(i) | ChildIndex::Normal(i) => i,
        }
    }

    pub fn is_hardened(self) -> bool {
        matches!(self, ChildIndex::Hardened(_))
    }

    /// The index as it goes on the wire: `i | 0x8000_0000` when hardened.
    pub fn to_bits(self) -> u32 {
        match self {
            ChildIndex::Hardened(i) => i | HARDENED_OFFSET,
            ChildIndex::Normal(i) => i,
        }
    }
}

impl fmt::Display for ChildIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildIndex::Hardened(i) => write!(f, "{i}'"),
            ChildIndex::Normal(i) => write!(f, "{i}"),
        }
    }
}

// ---------------------------------------------------------------------------
// DerivationPath
// ---------------------------------------------------------------------------

/// A position in the key tree, e.g. `m/44'/0'/0'/2'/1'`.
///
/// Parsing accepts `'` or `h` as the hardened marker; formatting always
/// emits `'`. Serializes as its text form.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DerivationPath {
    steps: Vec<ChildIndex>,
}

impl DerivationPath {
    /// Build a path from steps. Every index must be below `2^31`.
    pub fn new(steps: Vec<ChildIndex>) -> Result<Self, DerivationError> {
        if let Some(step) = steps.iter().find(|s| s.value() >= HARDENED_OFFSET) {
            return Err(DerivationError::IndexOutOfRange(step.value()));
        }
        Ok(Self { steps })
    }

    /// The path of the `index`-th key for `usage`:
    /// `m/44'/{coin_type}'/{account}'/{usage_branch}'/{index}'`.
    pub fn for_key(
        config: &DerivationConfig,
        usage: KeyUsage,
        index: u32,
    ) -> Result<Self, DerivationError> {
        Self::new(vec![
            ChildIndex::Hardened(BIP44_PURPOSE),
            ChildIndex::Hardened(config.coin_type),
            ChildIndex::Hardened(config.account),
            ChildIndex::Hardened(usage.branch()),
            ChildIndex::Hardened(index),
        ])
    }

    pub fn steps(&self) -> &[ChildIndex] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivationPath({self})")
    }
}

impl FromStr for DerivationPath {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('/');
        if parts.next() != Some("m") {
            return Err(DerivationError::InvalidPath(format!(
                "'{s}' must start with 'm'"
            )));
        }

        let mut steps = Vec::new();
        for part in parts {
            let (digits, hardened) = match part
                .strip_suffix('\'')
                .or_else(|| part.strip_suffix('h'))
            {
                Some(d) => (d, true),
                None => (part, false),
            };
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(DerivationError::InvalidPath(format!(
                    "bad step '{part}' in '{s}'"
                )));
            }
            let value: u32 = digits
                .parse()
                .map_err(|_| DerivationError::InvalidPath(format!("step '{part}' overflows")))?;
            steps.push(if hardened {
                ChildIndex::Hardened(value)
            } else {
                ChildIndex::Normal(value)
            });
        }
        Self::new(steps)
    }
}

impl TryFrom<String> for DerivationPath {
    type Error = DerivationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DerivationPath> for String {
    fn from(path: DerivationPath) -> Self {
        path.to_string()
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive a keypair of the given curve at `path`.
///
/// # Errors
///
/// - [`DerivationError::EmptyPath`] for `m` alone.
/// - [`DerivationError::NonHardenedStep`] if any step is normal.
/// - [`DerivationError::InvalidScalar`] if the agreement re-hash never
///   produces a usable key.
pub fn derive_key_at(
    seed: &Seed,
    path: &DerivationPath,
    curve: CurveType,
) -> Result<KeyMaterial, DerivationError> {
    let child = derive_ed25519_child(seed, path)?;
    let material = match curve {
        CurveType::Signing => KeyMaterial::Signing(SigningKeypair::from_seed(&child)),
        CurveType::Agreement => KeyMaterial::Agreement(agreement_from_child(&child)?),
    };

    debug!(
        path = %path,
        curve = %curve,
        fingerprint = %key_fingerprint(material.public_key().as_bytes()),
        "derived key"
    );
    Ok(material)
}

/// Derive the key for the `index`-th instance of `usage`, on the curve that
/// usage requires.
pub fn derive_key_for(
    seed: &Seed,
    config: &DerivationConfig,
    usage: KeyUsage,
    index: u32,
) -> Result<(DerivationPath, KeyMaterial), DerivationError> {
    let path = DerivationPath::for_key(config, usage, index)?;
    let material = derive_key_at(seed, &path, usage.required_curve())?;
    Ok((path, material))
}

/// Walk the SLIP-0010 Ed25519 tree and return the child private key bytes.
fn derive_ed25519_child(
    seed: &Seed,
    path: &DerivationPath,
) -> Result<Zeroizing<[u8; 32]>, DerivationError> {
    if path.is_empty() {
        return Err(DerivationError::EmptyPath);
    }
    // Reject before doing any HMAC work.
    for (position, step) in path.steps().iter().enumerate() {
        if let ChildIndex::Normal(index) = *step {
            return Err(DerivationError::NonHardenedStep { position, index });
        }
    }

    let master = Zeroizing::new(
        hmac_sha512(SLIP10_ED25519_SEED_KEY, seed.as_bytes()).map_err(|_| DerivationError::Hmac)?,
    );
    let (mut key, mut chain_code) = split_node(&master);

    let mut data = Zeroizing::new([0u8; 37]);
    for step in path.steps() {
        data[1..33].copy_from_slice(&key[..]);
        data[33..].copy_from_slice(&step.to_bits().to_be_bytes());

        let node = Zeroizing::new(
            hmac_sha512(&chain_code[..], &data[..]).map_err(|_| DerivationError::Hmac)?,
        );
        (key, chain_code) = split_node(&node);
    }
    Ok(key)
}

fn split_node(node: &[u8; 64]) -> (Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>) {
    let mut key = Zeroizing::new([0u8; 32]);
    let mut chain_code = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&node[..32]);
    chain_code.copy_from_slice(&node[32..]);
    (key, chain_code)
}

/// Turn Ed25519 child bytes into an X25519 keypair via SHA-256, re-hashing
/// while the public key comes out degenerate.
pub fn agreement_from_child(child: &[u8; 32]) -> Result<AgreementKeypair, DerivationError> {
    let mut candidate = Zeroizing::new(sha256(child));
    for attempt in 1..=MAX_AGREEMENT_REHASH_ATTEMPTS {
        let keypair = AgreementKeypair::from_secret_bytes(*candidate);
        if !keypair.public_key().is_degenerate() {
            return Ok(keypair);
        }
        warn!(attempt, "degenerate agreement key, re-hashing");
        *candidate = sha256(&candidate[..]);
    }
    Err(DerivationError::InvalidScalar {
        attempts: MAX_AGREEMENT_REHASH_ATTEMPTS,
    })
}
