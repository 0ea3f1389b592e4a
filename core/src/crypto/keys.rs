//! # Key Types
//!
//! The two key families an identity holds, and a closed sum over them.
//!
//! - [`SigningKeypair`]: Ed25519. Signs and verifies. Used for
//!   `authentication` and `assertionMethod` keys.
//! - [`AgreementKeypair`]: X25519. Does Diffie-Hellman and nothing else.
//!   Used for `keyAgreement` keys.
//! - [`KeyMaterial`]: one or the other. There is no way to ask an X25519
//!   key for a signature or an Ed25519 key for a DH output; the match arms
//!   simply don't exist.
//!
//! Every public key in this module is *computed* from the secret it sits
//! next to. There is no constructor that accepts a public key and a secret
//! key separately, so a record can never carry a mismatched pair.
//!
//! ## Security considerations
//!
//! - Secret bytes are returned wrapped in [`Zeroizing`] so callers don't
//!   leave copies on the stack.
//! - `Debug` never prints secret material, only the public half.
//! - Neither keypair implements `Serialize`. Exporting a private key goes
//!   through [`crate::identity::registry::PrivateKeyPolicy`].

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{AGREEMENT_KEY_LENGTH, SIGNATURE_LENGTH, SIGNING_KEY_LENGTH};

/// Multicodec prefix for an Ed25519 public key (`ed25519-pub`, 0xed).
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Multicodec prefix for an X25519 public key (`x25519-pub`, 0xec).
const X25519_MULTICODEC: [u8; 2] = [0xec, 0x01];

/// Errors that can occur while constructing or parsing keys.
///
/// A parse error on key material doesn't say which byte was wrong.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key bytes: expected 32 bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid point for this curve")]
    InvalidPublicKey,

    #[error("invalid signature bytes: expected 64 bytes")]
    InvalidSignature,

    #[error("invalid hex encoding")]
    InvalidHex,

    #[error("invalid multibase public key")]
    InvalidMultibase,
}

// ---------------------------------------------------------------------------
// CurveType
// ---------------------------------------------------------------------------

/// Which curve family a key lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CurveType {
    /// Ed25519, for signatures.
    Signing,
    /// X25519, for Diffie-Hellman key agreement.
    Agreement,
}

impl CurveType {
    /// The algorithm name for this curve family.
    pub fn algorithm(self) -> &'static str {
        match self {
            CurveType::Signing => crate::config::SIGNING_ALGORITHM,
            CurveType::Agreement => crate::config::KEY_AGREEMENT_ALGORITHM,
        }
    }
}

impl fmt::Display for CurveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveType::Signing => f.write_str("signing"),
            CurveType::Agreement => f.write_str("agreement"),
        }
    }
}

// ---------------------------------------------------------------------------
// SigningKeypair
// ---------------------------------------------------------------------------

/// An Ed25519 keypair.
///
/// # Examples
///
/// ```
/// use keyweave_core::crypto::keys::SigningKeypair;
///
/// let kp = SigningKeypair::from_seed(&[7u8; 32]);
/// let sig = kp.sign(b"hello");
/// assert!(kp.public_key().verify(b"hello", &sig));
/// ```
pub struct SigningKeypair {
    signing_key: SigningKey,
}

impl SigningKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build a keypair from 32 bytes used directly as the Ed25519 secret seed.
    ///
    /// This is how derived keys are materialized: the SLIP-0010 child key
    /// bytes go straight in here.
    pub fn from_seed(seed: &[u8; SIGNING_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Reconstruct a keypair from a secret key slice, checking the length.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; SIGNING_KEY_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&bytes))
    }

    /// The public half.
    pub fn public_key(&self) -> SigningPublicKey {
        SigningPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message. Ed25519 is deterministic: same key, same message,
    /// same signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing_key.sign(message);
        Signature {
            bytes: sig.to_bytes().to_vec(),
        }
    }

    /// Verify a signature against this keypair's public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Raw secret key bytes. Handle with care.
    pub fn secret_key_bytes(&self) -> Zeroizing<[u8; SIGNING_KEY_LENGTH]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl Clone for SigningKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKeypair(pub={})", self.public_key().to_hex())
    }
}

impl PartialEq for SigningKeypair {
    /// Compares public keys only. Comparing secrets in variable time is a
    /// habit worth not forming.
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for SigningKeypair {}

// ---------------------------------------------------------------------------
// SigningPublicKey
// ---------------------------------------------------------------------------

/// An Ed25519 public key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPublicKey {
    bytes: [u8; 32],
}

impl SigningPublicKey {
    /// Parse and validate a 32-byte Ed25519 public key.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Parse a hex-encoded public key.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidHex)?;
        Self::try_from_slice(&bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Lowercase hex. 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Multibase (base58btc, `z` prefix) over the `ed25519-pub` multicodec.
    pub fn to_multibase(&self) -> String {
        multibase(&ED25519_MULTICODEC, &self.bytes)
    }

    /// Verify a signature. Returns `false` for anything that isn't a valid
    /// signature by this key over this message, including malformed input.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Some(sig) = signature.to_dalek_signature() else {
            return false;
        };
        verifying_key.verify_strict(message, &sig).is_ok()
    }
}

impl Hash for SigningPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for SigningPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SigningPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// An Ed25519 signature.
///
/// Stored as a `Vec<u8>` so that anything arriving off the wire can be held
/// without a length check first. A signature that isn't 64 bytes never
/// verifies.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    bytes: Vec<u8>,
}

impl Signature {
    /// Wrap raw signature bytes of any length.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Parse a hex-encoded signature. Length is checked.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidHex)?;
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(KeyError::InvalidSignature);
        }
        Ok(Self { bytes })
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex. 128 characters for a well-formed signature.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub(crate) fn to_dalek_signature(&self) -> Option<DalekSignature> {
        let arr: [u8; SIGNATURE_LENGTH] = self.bytes.as_slice().try_into().ok()?;
        Some(DalekSignature::from_bytes(&arr))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "Signature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "Signature({})", hex_str)
        }
    }
}

// ---------------------------------------------------------------------------
// AgreementKeypair
// ---------------------------------------------------------------------------

/// An X25519 static keypair.
///
/// Static rather than ephemeral: agreement keys are derived from the seed
/// and reused for every message to and from this identity.
#[derive(Clone)]
pub struct AgreementKeypair {
    secret: x25519_dalek::StaticSecret,
    public: x25519_dalek::PublicKey,
}

impl AgreementKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let public = x25519_dalek::PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Build a keypair from 32 raw secret bytes. Clamping happens inside
    /// the scalar multiplication, so any 32 bytes are accepted.
    pub fn from_secret_bytes(bytes: [u8; AGREEMENT_KEY_LENGTH]) -> Self {
        let secret = x25519_dalek::StaticSecret::from(bytes);
        let public = x25519_dalek::PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Reconstruct a keypair from a secret key slice, checking the length.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; AGREEMENT_KEY_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_secret_bytes(bytes))
    }

    /// The public half.
    pub fn public_key(&self) -> AgreementPublicKey {
        AgreementPublicKey {
            bytes: self.public.to_bytes(),
        }
    }

    /// Raw Diffie-Hellman. Prefer [`crate::crypto::agreement::shared_secret`],
    /// which rejects low-order peers.
    pub(crate) fn diffie_hellman(
        &self,
        other: &AgreementPublicKey,
    ) -> x25519_dalek::SharedSecret {
        let peer = x25519_dalek::PublicKey::from(other.bytes);
        self.secret.diffie_hellman(&peer)
    }

    /// Raw secret key bytes. Handle with care.
    pub fn secret_key_bytes(&self) -> Zeroizing<[u8; AGREEMENT_KEY_LENGTH]> {
        Zeroizing::new(self.secret.to_bytes())
    }
}

impl fmt::Debug for AgreementKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgreementKeypair(pub={})", self.public_key().to_hex())
    }
}

impl PartialEq for AgreementKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for AgreementKeypair {}

// ---------------------------------------------------------------------------
// AgreementPublicKey
// ---------------------------------------------------------------------------

/// An X25519 public key (Montgomery u-coordinate).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgreementPublicKey {
    bytes: [u8; 32],
}

impl AgreementPublicKey {
    /// Wrap 32 bytes. Every 32-byte string is a valid u-coordinate for
    /// X25519; low-order points are caught at agreement time instead.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Parse from a slice, checking the length.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Parse a hex-encoded public key.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidHex)?;
        Self::try_from_slice(&bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Lowercase hex. 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Multibase (base58btc, `z` prefix) over the `x25519-pub` multicodec.
    pub fn to_multibase(&self) -> String {
        multibase(&X25519_MULTICODEC, &self.bytes)
    }

    /// True for the all-zero u-coordinate, which no clamped scalar maps to
    /// from the base point.
    pub(crate) fn is_degenerate(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for AgreementPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AgreementPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgreementPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// KeyMaterial / PublicKey
// ---------------------------------------------------------------------------

/// A keypair on one of the two supported curves.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Signing(SigningKeypair),
    Agreement(AgreementKeypair),
}

impl KeyMaterial {
    /// Rebuild key material from raw secret bytes for the given curve.
    pub fn from_secret_bytes(curve: CurveType, secret: &[u8]) -> Result<Self, KeyError> {
        match curve {
            CurveType::Signing => SigningKeypair::try_from_slice(secret).map(Self::Signing),
            CurveType::Agreement => AgreementKeypair::try_from_slice(secret).map(Self::Agreement),
        }
    }

    pub fn curve_type(&self) -> CurveType {
        match self {
            KeyMaterial::Signing(_) => CurveType::Signing,
            KeyMaterial::Agreement(_) => CurveType::Agreement,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyMaterial::Signing(kp) => PublicKey::Signing(kp.public_key()),
            KeyMaterial::Agreement(kp) => PublicKey::Agreement(kp.public_key()),
        }
    }

    pub fn secret_key_bytes(&self) -> Zeroizing<[u8; 32]> {
        match self {
            KeyMaterial::Signing(kp) => kp.secret_key_bytes(),
            KeyMaterial::Agreement(kp) => kp.secret_key_bytes(),
        }
    }

    pub fn as_signing(&self) -> Option<&SigningKeypair> {
        match self {
            KeyMaterial::Signing(kp) => Some(kp),
            KeyMaterial::Agreement(_) => None,
        }
    }

    pub fn as_agreement(&self) -> Option<&AgreementKeypair> {
        match self {
            KeyMaterial::Agreement(kp) => Some(kp),
            KeyMaterial::Signing(_) => None,
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Signing(kp) => kp.fmt(f),
            KeyMaterial::Agreement(kp) => kp.fmt(f),
        }
    }
}

/// The public half of a [`KeyMaterial`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PublicKey {
    Signing(SigningPublicKey),
    Agreement(AgreementPublicKey),
}

impl PublicKey {
    pub fn curve_type(&self) -> CurveType {
        match self {
            PublicKey::Signing(_) => CurveType::Signing,
            PublicKey::Agreement(_) => CurveType::Agreement,
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        match self {
            PublicKey::Signing(pk) => pk.as_bytes(),
            PublicKey::Agreement(pk) => pk.as_bytes(),
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    pub fn to_multibase(&self) -> String {
        match self {
            PublicKey::Signing(pk) => pk.to_multibase(),
            PublicKey::Agreement(pk) => pk.to_multibase(),
        }
    }

    /// Decode a `z`-prefixed base58btc key. The multicodec prefix picks the
    /// curve.
    pub fn from_multibase(s: &str) -> Result<Self, KeyError> {
        let encoded = s.strip_prefix('z').ok_or(KeyError::InvalidMultibase)?;
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|_| KeyError::InvalidMultibase)?;
        if bytes.len() != 34 {
            return Err(KeyError::InvalidMultibase);
        }
        let (codec, key) = bytes.split_at(2);
        match [codec[0], codec[1]] {
            ED25519_MULTICODEC => SigningPublicKey::try_from_slice(key).map(PublicKey::Signing),
            X25519_MULTICODEC => AgreementPublicKey::try_from_slice(key).map(PublicKey::Agreement),
            _ => Err(KeyError::InvalidMultibase),
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn multibase(codec: &[u8; 2], key: &[u8; 32]) -> String {
    let mut buf = Vec::with_capacity(34);
    buf.extend_from_slice(codec);
    buf.extend_from_slice(key);
    format!("z{}", bs58::encode(buf).into_string())
}
