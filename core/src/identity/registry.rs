//! # Key Registry
//!
//! The ordered set of keys one identity holds, all derived from one seed.
//!
//! ## Record identity
//!
//! Every record gets a [`KeyId`] when it is created. Ids are sequential,
//! registry-scoped and never reused, even after the record is removed.
//! Derivation indices work the same way per usage: the `n`-th
//! authentication key ever created sits at index `n`, and removing it does
//! not free the index. Two records therefore never share a path.
//!
//! ## Lifecycle
//!
//! ```text
//! add_key ──► Active ⇄ Deactivated ──remove_key──► Deleted
//!               └──────── regenerate_all keeps the state ────┘
//! ```
//!
//! ## Regeneration
//!
//! [`KeyRegistry::regenerate_all`] re-derives every record at its recorded
//! path from a new seed. All new material is computed into a staging
//! buffer first; the registry only changes once every derivation has
//! succeeded, so a failure leaves it exactly as it was.
//!
//! ## Concurrency
//!
//! Index assignment is read-then-write. `&mut self` already serializes
//! writers for a single owner; [`SharedRegistry`] does it across threads.

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::derivation::{derive_key_at, derive_key_for, DerivationError, DerivationPath};
use super::seed::{derive_seed, Mnemonic, Seed};
use crate::config::{ConfigError, DerivationConfig, AES_KEY_LENGTH};
use crate::crypto::encryption::{decrypt_with_aad, encrypt_with_aad, EncryptionError};
use crate::crypto::hash::key_fingerprint;
use crate::crypto::keys::{CurveType, KeyError, KeyMaterial, PublicKey};

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid derivation config: {0}")]
    Config(#[from] ConfigError),

    #[error("{usage} keys must use the {} curve, not {curve}", .usage.required_curve())]
    UsageCurveMismatch { usage: KeyUsage, curve: CurveType },

    #[error("no key with id {0}")]
    UnknownKey(KeyId),

    #[error("derivation failed: {0}")]
    Derivation(#[from] DerivationError),

    /// A record's material does not match its path. Never expected; treat
    /// as fatal.
    #[error("registry inconsistent: {0}")]
    Inconsistent(String),

    #[error("stored key material: {0}")]
    Key(#[from] KeyError),

    #[error("stored key decryption: {0}")]
    Storage(#[from] EncryptionError),

    #[error("stored key is encrypted but no storage key was supplied")]
    MissingStorageKey,

    #[error("stored key is not valid hex")]
    InvalidHex,

    /// Every key id has been issued. Ids are never reused, so no further
    /// key can be added to this registry.
    #[error("key id space exhausted")]
    IdSpaceExhausted,
}

// ---------------------------------------------------------------------------
// KeyUsage / KeyId / KeyState
// ---------------------------------------------------------------------------

/// What a key is for. Each usage admits exactly one curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyUsage {
    Authentication,
    Assertion,
    KeyAgreement,
}

impl KeyUsage {
    pub const ALL: [KeyUsage; 3] = [
        KeyUsage::Authentication,
        KeyUsage::Assertion,
        KeyUsage::KeyAgreement,
    ];

    /// The derivation branch below the account level.
    pub fn branch(self) -> u32 {
        match self {
            KeyUsage::Authentication => 0,
            KeyUsage::Assertion => 1,
            KeyUsage::KeyAgreement => 2,
        }
    }

    /// The only curve this usage may be paired with.
    pub fn required_curve(self) -> CurveType {
        match self {
            KeyUsage::Authentication | KeyUsage::Assertion => CurveType::Signing,
            KeyUsage::KeyAgreement => CurveType::Agreement,
        }
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyUsage::Authentication => "authentication",
            KeyUsage::Assertion => "assertion",
            KeyUsage::KeyAgreement => "keyAgreement",
        })
    }
}

/// Permanent, registry-scoped key identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub u64);

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a key is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyState {
    Active,
    Deactivated,
    /// Terminal. The record is gone; its id and index stay retired.
    Deleted,
}

// ---------------------------------------------------------------------------
// KeyRecord
// ---------------------------------------------------------------------------

/// One derived key and its metadata.
///
/// The curve is read off the material, and the public key is computed from
/// it, so neither can drift from the private half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    id: KeyId,
    name: String,
    usage: KeyUsage,
    active: bool,
    index: u32,
    derivation_path: DerivationPath,
    material: KeyMaterial,
}

impl KeyRecord {
    pub fn id(&self) -> KeyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> KeyUsage {
        self.usage
    }

    pub fn curve_type(&self) -> CurveType {
        self.material.curve_type()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> KeyState {
        if self.active {
            KeyState::Active
        } else {
            KeyState::Deactivated
        }
    }

    /// Position among keys of the same usage.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn derivation_path(&self) -> &DerivationPath {
        &self.derivation_path
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    pub fn public_key(&self) -> PublicKey {
        self.material.public_key()
    }

    /// Short log-safe fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        key_fingerprint(self.material.public_key().as_bytes())
    }

    /// The storage form of this record, with the private key handled per
    /// `policy`.
    pub fn to_stored(&self, policy: &PrivateKeyPolicy<'_>) -> Result<StoredKeyRecord, RegistryError> {
        let public_key = self.public_key().to_hex();
        let secret = self.material.secret_key_bytes();
        let private_key = match policy {
            PrivateKeyPolicy::Raw => StoredPrivateKey::Raw {
                hex: hex::encode(&secret[..]),
            },
            PrivateKeyPolicy::Encrypted(storage_key) => {
                let aad = storage_aad(&self.derivation_path, &public_key);
                let sealed = encrypt_with_aad(storage_key, &secret[..], &aad)?;
                StoredPrivateKey::Aes256Gcm {
                    ciphertext: hex::encode(sealed),
                }
            }
        };

        Ok(StoredKeyRecord {
            id: self.id,
            name: self.name.clone(),
            usage: self.usage,
            curve_type: self.curve_type(),
            active: self.active,
            index: self.index,
            derivation_path: self.derivation_path.clone(),
            public_key,
            private_key,
        })
    }
}

// ---------------------------------------------------------------------------
// Storage forms
// ---------------------------------------------------------------------------

/// How private keys leave the registry.
pub enum PrivateKeyPolicy<'a> {
    /// Hex-encoded raw secret bytes.
    Raw,
    /// AES-256-GCM under a caller-held 32-byte storage key.
    Encrypted(&'a [u8; AES_KEY_LENGTH]),
}

/// A private key in storage form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum StoredPrivateKey {
    #[serde(rename = "raw")]
    Raw { hex: String },
    /// `nonce || ciphertext || tag`, hex. The AAD binds the record's path and
    /// public key, so a blob can't be moved onto another record.
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm { ciphertext: String },
}

impl fmt::Debug for StoredPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredPrivateKey::Raw { .. } => f.write_str("StoredPrivateKey::Raw(<redacted>)"),
            StoredPrivateKey::Aes256Gcm { ciphertext } => {
                write!(f, "StoredPrivateKey::Aes256Gcm({} hex chars)", ciphertext.len())
            }
        }
    }
}

/// A key record as handed to the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeyRecord {
    pub id: KeyId,
    pub name: String,
    pub usage: KeyUsage,
    pub curve_type: CurveType,
    pub active: bool,
    pub index: u32,
    pub derivation_path: DerivationPath,
    /// Lowercase hex.
    pub public_key: String,
    pub private_key: StoredPrivateKey,
}

impl StoredKeyRecord {
    /// Recover the key material from the stored private key and check it
    /// against the stored public key.
    pub fn key_material(
        &self,
        storage_key: Option<&[u8; AES_KEY_LENGTH]>,
    ) -> Result<KeyMaterial, RegistryError> {
        let secret = match &self.private_key {
            StoredPrivateKey::Raw { hex } => {
                Zeroizing::new(hex::decode(hex).map_err(|_| RegistryError::InvalidHex)?)
            }
            StoredPrivateKey::Aes256Gcm { ciphertext } => {
                let key = storage_key.ok_or(RegistryError::MissingStorageKey)?;
                let sealed = hex::decode(ciphertext).map_err(|_| RegistryError::InvalidHex)?;
                let aad = storage_aad(&self.derivation_path, &self.public_key.to_lowercase());
                Zeroizing::new(decrypt_with_aad(key, &sealed, &aad)?)
            }
        };

        let material = KeyMaterial::from_secret_bytes(self.curve_type, &secret)?;
        if !material.public_key().to_hex().eq_ignore_ascii_case(&self.public_key) {
            return Err(RegistryError::Inconsistent(format!(
                "stored private key for key {} does not match its public key",
                self.id
            )));
        }
        Ok(material)
    }
}

fn storage_aad(path: &DerivationPath, public_key_hex: &str) -> Vec<u8> {
    format!("keyweave stored key|{path}|{public_key_hex}").into_bytes()
}

/// Next free derivation index per usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexWatermarks {
    pub authentication: u32,
    pub assertion: u32,
    pub key_agreement: u32,
}

impl IndexWatermarks {
    pub fn get(&self, usage: KeyUsage) -> u32 {
        match usage {
            KeyUsage::Authentication => self.authentication,
            KeyUsage::Assertion => self.assertion,
            KeyUsage::KeyAgreement => self.key_agreement,
        }
    }

    fn slot(&mut self, usage: KeyUsage) -> &mut u32 {
        match usage {
            KeyUsage::Authentication => &mut self.authentication,
            KeyUsage::Assertion => &mut self.assertion,
            KeyUsage::KeyAgreement => &mut self.key_agreement,
        }
    }

    fn raise(&mut self, usage: KeyUsage, at_least: u32) {
        let slot = self.slot(usage);
        *slot = (*slot).max(at_least);
    }
}

/// Everything needed to rebuild a registry, minus the seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub config: DerivationConfig,
    pub next_id: u64,
    pub next_index: IndexWatermarks,
    pub keys: Vec<StoredKeyRecord>,
}

/// One entry of a batch key request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRequest {
    pub usage: KeyUsage,
    pub curve_type: CurveType,
    pub name: String,
}

impl KeyRequest {
    /// A request on the curve `usage` requires.
    pub fn new(usage: KeyUsage, name: impl Into<String>) -> Self {
        Self {
            usage,
            curve_type: usage.required_curve(),
            name: name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// KeyRegistry
// ---------------------------------------------------------------------------

/// The keys of one identity.
pub struct KeyRegistry {
    seed: Seed,
    config: DerivationConfig,
    records: Vec<KeyRecord>,
    next_id: u64,
    next_index: IndexWatermarks,
}

impl KeyRegistry {
    /// An empty registry over `seed`.
    pub fn new(seed: Seed, config: DerivationConfig) -> Result<Self, RegistryError> {
        config.validate()?;
        Ok(Self {
            seed,
            config,
            records: Vec::new(),
            next_id: 0,
            next_index: IndexWatermarks::default(),
        })
    }

    /// An empty registry over the seed of `mnemonic` and `passphrase`.
    pub fn from_mnemonic(
        mnemonic: &Mnemonic,
        passphrase: &str,
        config: DerivationConfig,
    ) -> Result<Self, RegistryError> {
        Self::new(derive_seed(mnemonic, passphrase), config)
    }

    pub fn config(&self) -> &DerivationConfig {
        &self.config
    }

    fn stage_key(
        &self,
        id: KeyId,
        usage: KeyUsage,
        curve: CurveType,
        name: &str,
        index: u32,
    ) -> Result<KeyRecord, RegistryError> {
        if usage.required_curve() != curve {
            return Err(RegistryError::UsageCurveMismatch { usage, curve });
        }
        let (derivation_path, material) = derive_key_for(&self.seed, &self.config, usage, index)?;
        Ok(KeyRecord {
            id,
            name: name.to_string(),
            usage,
            active: true,
            index,
            derivation_path,
            material,
        })
    }

    /// Derive the next key for `usage` and append it, active.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UsageCurveMismatch`] if `curve` isn't the one
    /// `usage` requires. Nothing is consumed on error.
    pub fn add_key(
        &mut self,
        usage: KeyUsage,
        curve: CurveType,
        name: impl Into<String>,
    ) -> Result<&KeyRecord, RegistryError> {
        let name = name.into();
        let index = self.next_index.get(usage);
        let next_id = self.next_id.checked_add(1).ok_or(RegistryError::IdSpaceExhausted)?;
        let record = self.stage_key(KeyId(self.next_id), usage, curve, &name, index)?;

        info!(
            key_id = %record.id,
            usage = %usage,
            path = %record.derivation_path,
            fingerprint = %record.fingerprint(),
            "key added"
        );

        self.next_id = next_id;
        *self.next_index.slot(usage) += 1;
        let position = self.records.len();
        self.records.push(record);
        Ok(&self.records[position])
    }

    /// Add several keys. Either all of them are added or none are.
    pub fn add_keys(&mut self, requests: &[KeyRequest]) -> Result<Vec<KeyId>, RegistryError> {
        let mut next_id = self.next_id;
        let mut next_index = self.next_index;
        let mut staged = Vec::with_capacity(requests.len());

        for request in requests {
            let index = next_index.get(request.usage);
            let following = next_id.checked_add(1).ok_or(RegistryError::IdSpaceExhausted)?;
            staged.push(self.stage_key(
                KeyId(next_id),
                request.usage,
                request.curve_type,
                &request.name,
                index,
            )?);
            next_id = following;
            *next_index.slot(request.usage) += 1;
        }

        let ids: Vec<KeyId> = staged.iter().map(KeyRecord::id).collect();
        info!(count = ids.len(), "keys added");
        self.records.extend(staged);
        self.next_id = next_id;
        self.next_index = next_index;
        Ok(ids)
    }

    /// Flip a key's active flag. The material is kept either way. Documents
    /// are not rebuilt here; callers pull a new one when they need it.
    pub fn set_active(&mut self, id: KeyId, active: bool) -> Result<(), RegistryError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RegistryError::UnknownKey(id))?;
        record.active = active;
        debug!(key_id = %id, active, "key activation changed");
        Ok(())
    }

    /// Remove a key for good. Its id and index are retired.
    pub fn remove_key(&mut self, id: KeyId) -> Result<KeyRecord, RegistryError> {
        let position = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or(RegistryError::UnknownKey(id))?;
        let record = self.records.remove(position);
        info!(key_id = %id, usage = %record.usage, "key removed");
        Ok(record)
    }

    /// Replace the seed and re-derive every record at its recorded path.
    ///
    /// Ids, names, usages, indices, paths and active flags are preserved.
    pub fn regenerate_all(
        &mut self,
        mnemonic: &Mnemonic,
        passphrase: &str,
    ) -> Result<(), RegistryError> {
        self.regenerate_from_seed(derive_seed(mnemonic, passphrase))
    }

    /// [`regenerate_all`](Self::regenerate_all) for a caller that already
    /// holds the seed.
    pub fn regenerate_from_seed(&mut self, seed: Seed) -> Result<(), RegistryError> {
        let staged = self
            .records
            .iter()
            .map(|r| derive_key_at(&seed, &r.derivation_path, r.curve_type()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                warn!(error = %e, "regeneration aborted, registry unchanged");
                e
            })?;

        self.seed = seed;
        for (record, material) in self.records.iter_mut().zip(staged) {
            record.material = material;
        }
        info!(keys = self.records.len(), "registry regenerated from new seed");
        Ok(())
    }

    /// Re-derive every record and confirm it still matches.
    ///
    /// Checks the usage/curve pairing, that each path is the one its usage
    /// and index dictate, that no two records share a path, and that the
    /// material equals a fresh derivation.
    pub fn check_consistency(&self) -> Result<(), RegistryError> {
        let mut paths = HashSet::new();
        for record in &self.records {
            let expected = DerivationPath::for_key(&self.config, record.usage, record.index)?;
            let problem = if record.usage.required_curve() != record.curve_type() {
                Some("usage and curve disagree")
            } else if expected != record.derivation_path {
                Some("path does not match usage and index")
            } else if !paths.insert(record.derivation_path.clone()) {
                Some("path shared with another key")
            } else {
                let fresh =
                    derive_key_at(&self.seed, &record.derivation_path, record.curve_type())?;
                (fresh.public_key() != record.public_key()).then_some("material does not match path")
            };

            if let Some(problem) = problem {
                warn!(key_id = %record.id, problem, "registry consistency check failed");
                return Err(RegistryError::Inconsistent(format!(
                    "key {}: {problem}",
                    record.id
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: KeyId) -> Option<&KeyRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// First record with this name, in registry order.
    pub fn find_by_name(&self, name: &str) -> Option<&KeyRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Lifecycle state of `id`: `None` if it was never issued.
    pub fn state(&self, id: KeyId) -> Option<KeyState> {
        match self.get(id) {
            Some(record) => Some(record.state()),
            None if id.0 < self.next_id => Some(KeyState::Deleted),
            None => None,
        }
    }

    /// All records in registry order.
    pub fn records(&self) -> &[KeyRecord] {
        &self.records
    }

    /// Active records in registry order.
    pub fn active_records(&self) -> impl Iterator<Item = &KeyRecord> {
        self.records.iter().filter(|r| r.active)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Next free index per usage.
    pub fn watermarks(&self) -> IndexWatermarks {
        self.next_index
    }

    /// Storage form of the whole registry. The seed is not included.
    pub fn to_stored(&self, policy: &PrivateKeyPolicy<'_>) -> Result<RegistrySnapshot, RegistryError> {
        Ok(RegistrySnapshot {
            config: self.config,
            next_id: self.next_id,
            next_index: self.next_index,
            keys: self
                .records
                .iter()
                .map(|r| r.to_stored(policy))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Rebuild a registry from its snapshot and seed.
    ///
    /// Every record is re-derived from `seed` and its stored public key must
    /// match. Stored private keys are not read.
    pub fn from_stored(seed: Seed, snapshot: &RegistrySnapshot) -> Result<Self, RegistryError> {
        let mut registry = Self::new(seed, snapshot.config)?;
        let mut ids = HashSet::new();

        for stored in &snapshot.keys {
            let record = registry.stage_key(
                stored.id,
                stored.usage,
                stored.curve_type,
                &stored.name,
                stored.index,
            )?;
            if record.derivation_path != stored.derivation_path {
                return Err(RegistryError::Inconsistent(format!(
                    "key {}: stored path {} does not match usage and index",
                    stored.id, stored.derivation_path
                )));
            }
            if !record.public_key().to_hex().eq_ignore_ascii_case(&stored.public_key) {
                return Err(RegistryError::Inconsistent(format!(
                    "key {}: stored public key does not match the seed",
                    stored.id
                )));
            }
            if !ids.insert(stored.id) {
                return Err(RegistryError::Inconsistent(format!(
                    "key {} appears twice",
                    stored.id
                )));
            }

            let after = stored.id.0.checked_add(1).ok_or(RegistryError::IdSpaceExhausted)?;
            registry.next_id = registry.next_id.max(after);
            registry
                .next_index
                .raise(stored.usage, stored.index.saturating_add(1));
            registry.records.push(KeyRecord {
                active: stored.active,
                ..record
            });
        }

        registry.next_id = registry.next_id.max(snapshot.next_id);
        for usage in KeyUsage::ALL {
            registry.next_index.raise(usage, snapshot.next_index.get(usage));
        }
        registry.check_consistency()?;

        info!(keys = registry.len(), "registry restored from storage");
        Ok(registry)
    }
}

impl fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("config", &self.config)
            .field("keys", &self.records.len())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// SharedRegistry
// ---------------------------------------------------------------------------

/// A registry shared between threads. Writers are serialized, so concurrent
/// `add_key` calls never hand out the same index.
#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<RwLock<KeyRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: KeyRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    pub fn add_key(
        &self,
        usage: KeyUsage,
        curve: CurveType,
        name: impl Into<String>,
    ) -> Result<KeyId, RegistryError> {
        self.inner.write().add_key(usage, curve, name).map(KeyRecord::id)
    }

    pub fn set_active(&self, id: KeyId, active: bool) -> Result<(), RegistryError> {
        self.inner.write().set_active(id, active)
    }

    pub fn remove_key(&self, id: KeyId) -> Result<KeyRecord, RegistryError> {
        self.inner.write().remove_key(id)
    }

    pub fn regenerate_all(&self, mnemonic: &Mnemonic, passphrase: &str) -> Result<(), RegistryError> {
        self.inner.write().regenerate_all(mnemonic, passphrase)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, KeyRegistry> {
        self.inner.read()
    }
}

impl fmt::Debug for SharedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedRegistry").field(&*self.inner.read()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::seed::{generate_mnemonic, parse_mnemonic};

    const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";

    fn registry() -> KeyRegistry {
        let m = parse_mnemonic(ABANDON_ABOUT).unwrap();
        KeyRegistry::from_mnemonic(&m, "", DerivationConfig::default()).unwrap()
    }

    fn registry_seed() -> Seed {
        derive_seed(&parse_mnemonic(ABANDON_ABOUT).unwrap(), "")
    }

    #[test]
    fn test_usage_serde_names() {
        assert_eq!(
            serde_json::to_string(&KeyUsage::KeyAgreement).unwrap(),
            "\"keyAgreement\""
        );
        assert_eq!(
            serde_json::from_str::<KeyUsage>("\"authentication\"").unwrap(),
            KeyUsage::Authentication
        );
    }

    #[test]
    fn test_add_key_assigns_sequential_indices() {
        let mut reg = registry();
        let a0 = reg.add_key(KeyUsage::Authentication, CurveType::Signing, "a0").unwrap().id();
        let k0 = reg.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "k0").unwrap().id();
        let a1 = reg.add_key(KeyUsage::Authentication, CurveType::Signing, "a1").unwrap().id();

        assert_eq!((a0, k0, a1), (KeyId(0), KeyId(1), KeyId(2)));
        assert_eq!(reg.get(a0).unwrap().index(), 0);
        assert_eq!(reg.get(k0).unwrap().index(), 0);
        assert_eq!(reg.get(a1).unwrap().index(), 1);
        assert_eq!(reg.get(a1).unwrap().derivation_path().to_string(), "m/44'/0'/0'/0'/1'");
        assert_eq!(reg.get(k0).unwrap().derivation_path().to_string(), "m/44'/0'/0'/2'/0'");
        assert!(reg.get(a0).unwrap().is_active());
    }

    #[test]
    fn test_add_key_matches_conformance_vector() {
        let mut reg = registry();
        let record = reg.add_key(KeyUsage::Authentication, CurveType::Signing, "login").unwrap();
        assert_eq!(
            record.public_key().to_hex(),
            "7c2e79f3a1701fb2a86a2c24a3fdf8634b7aad80886c0c0a526d44d23fe8e19a"
        );
    }

    #[test]
    fn test_usage_curve_mismatch_rejected() {
        let mut reg = registry();
        let err = reg
            .add_key(KeyUsage::KeyAgreement, CurveType::Signing, "bad")
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UsageCurveMismatch {
                usage: KeyUsage::KeyAgreement,
                curve: CurveType::Signing
            }
        ));
        assert!(reg.is_empty());
        assert_eq!(reg.watermarks(), IndexWatermarks::default());
    }

    #[test]
    fn test_add_keys_is_all_or_nothing() {
        let mut reg = registry();
        let bad = [
            KeyRequest::new(KeyUsage::Authentication, "ok"),
            KeyRequest {
                usage: KeyUsage::Assertion,
                curve_type: CurveType::Agreement,
                name: "bad".into(),
            },
        ];
        assert!(reg.add_keys(&bad).is_err());
        assert!(reg.is_empty());

        let ids = reg
            .add_keys(&[
                KeyRequest::new(KeyUsage::Authentication, "auth"),
                KeyRequest::new(KeyUsage::KeyAgreement, "dh"),
            ])
            .unwrap();
        assert_eq!(ids, vec![KeyId(0), KeyId(1)]);
        assert_eq!(reg.get(KeyId(1)).unwrap().curve_type(), CurveType::Agreement);
    }

    #[test]
    fn test_set_active_keeps_material() {
        let mut reg = registry();
        let id = reg.add_key(KeyUsage::Assertion, CurveType::Signing, "vc").unwrap().id();
        let before = reg.get(id).unwrap().public_key();

        reg.set_active(id, false).unwrap();
        assert_eq!(reg.state(id), Some(KeyState::Deactivated));
        assert_eq!(reg.active_records().count(), 0);
        assert_eq!(reg.get(id).unwrap().public_key(), before);

        reg.set_active(id, true).unwrap();
        assert_eq!(reg.state(id), Some(KeyState::Active));
        assert!(matches!(
            reg.set_active(KeyId(99), true),
            Err(RegistryError::UnknownKey(KeyId(99)))
        ));
    }

    #[test]
    fn test_removed_index_never_reused() {
        let mut reg = registry();
        let first = reg.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "k0").unwrap().id();
        let removed = reg.remove_key(first).unwrap();
        assert_eq!(removed.index(), 0);
        assert_eq!(reg.state(first), Some(KeyState::Deleted));
        assert_eq!(reg.state(KeyId(7)), None);

        let next = reg.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "k1").unwrap();
        assert_eq!(next.id(), KeyId(1));
        assert_eq!(next.index(), 1);
        assert_ne!(next.public_key(), removed.public_key());
    }

    #[test]
    fn test_regenerate_preserves_shape() {
        let mut reg = registry();
        let auth = reg.add_key(KeyUsage::Authentication, CurveType::Signing, "K1").unwrap().id();
        let dh = reg.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "K2").unwrap().id();
        reg.set_active(dh, false).unwrap();
        let old: Vec<_> = reg.records().iter().map(KeyRecord::public_key).collect();

        let fresh = generate_mnemonic(12).unwrap();
        reg.regenerate_all(&fresh, "").unwrap();

        assert_eq!(reg.len(), 2);
        let a = reg.get(auth).unwrap();
        let k = reg.get(dh).unwrap();
        assert_eq!((a.name(), a.usage(), a.is_active()), ("K1", KeyUsage::Authentication, true));
        assert_eq!((k.name(), k.usage(), k.is_active()), ("K2", KeyUsage::KeyAgreement, false));
        assert_ne!(a.public_key(), old[0]);
        assert_ne!(k.public_key(), old[1]);

        // New material is exactly what the new mnemonic derives.
        let mut expected = KeyRegistry::from_mnemonic(&fresh, "", DerivationConfig::default()).unwrap();
        let expected = expected
            .add_key(KeyUsage::Authentication, CurveType::Signing, "x")
            .unwrap()
            .public_key();
        assert_eq!(a.public_key(), expected);
        reg.check_consistency().unwrap();
    }

    #[test]
    fn test_regenerate_same_mnemonic_is_identity() {
        let mut reg = registry();
        reg.add_key(KeyUsage::Assertion, CurveType::Signing, "a").unwrap();
        let before = reg.records()[0].public_key();
        reg.regenerate_all(&parse_mnemonic(ABANDON_ABOUT).unwrap(), "").unwrap();
        assert_eq!(reg.records()[0].public_key(), before);
    }

    #[test]
    fn test_check_consistency_detects_tampering() {
        let mut reg = registry();
        reg.add_key(KeyUsage::Authentication, CurveType::Signing, "a").unwrap();
        reg.check_consistency().unwrap();

        reg.records[0].material = KeyMaterial::Signing(crate::crypto::keys::SigningKeypair::generate());
        assert!(matches!(
            reg.check_consistency(),
            Err(RegistryError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_failed_regeneration_changes_nothing() {
        let mut reg = registry();
        reg.add_key(KeyUsage::Authentication, CurveType::Signing, "a").unwrap();
        reg.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "k").unwrap();
        reg.records[1].derivation_path = "m/44'/0'/0'/2'/0".parse().unwrap();
        let before: Vec<_> = reg.records().iter().map(KeyRecord::public_key).collect();
        let seed_before = *reg.seed.as_bytes();

        let err = reg.regenerate_all(&generate_mnemonic(24).unwrap(), "").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Derivation(DerivationError::NonHardenedStep { .. })
        ));

        let after: Vec<_> = reg.records().iter().map(KeyRecord::public_key).collect();
        assert_eq!(before, after);
        assert_eq!(reg.seed.as_bytes(), &seed_before);

        // Restore the path: the untouched material still matches the old seed.
        reg.records[1].derivation_path =
            DerivationPath::for_key(reg.config(), KeyUsage::KeyAgreement, 0).unwrap();
        reg.check_consistency().unwrap();
    }

    #[test]
    fn test_exhausted_id_space_is_an_error() {
        let mut reg = registry();
        reg.add_key(KeyUsage::Authentication, CurveType::Signing, "a").unwrap();
        let mut snapshot = reg.to_stored(&PrivateKeyPolicy::Raw).unwrap();
        snapshot.next_id = u64::MAX;

        let mut restored = KeyRegistry::from_stored(registry_seed(), &snapshot).unwrap();
        assert!(matches!(
            restored.add_key(KeyUsage::Authentication, CurveType::Signing, "x"),
            Err(RegistryError::IdSpaceExhausted)
        ));
        assert!(matches!(
            restored.add_keys(&[KeyRequest::new(KeyUsage::Assertion, "y")]),
            Err(RegistryError::IdSpaceExhausted)
        ));
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.state(KeyId(0)), Some(KeyState::Active));

        snapshot.keys[0].id = KeyId(u64::MAX);
        assert!(matches!(
            KeyRegistry::from_stored(registry_seed(), &snapshot),
            Err(RegistryError::IdSpaceExhausted)
        ));
    }

    #[test]
    fn test_find_by_name() {
        let mut reg = registry();
        reg.add_key(KeyUsage::Authentication, CurveType::Signing, "login").unwrap();
        reg.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "inbox").unwrap();
        assert_eq!(reg.find_by_name("inbox").unwrap().id(), KeyId(1));
        assert!(reg.find_by_name("missing").is_none());
    }

    #[test]
    fn test_stored_roundtrip_raw() {
        let mut reg = registry();
        reg.add_key(KeyUsage::Authentication, CurveType::Signing, "a").unwrap();
        let dh = reg.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "k").unwrap().id();
        reg.add_key(KeyUsage::Assertion, CurveType::Signing, "gone").unwrap();
        reg.remove_key(KeyId(2)).unwrap();
        reg.set_active(dh, false).unwrap();

        let snapshot = reg.to_stored(&PrivateKeyPolicy::Raw).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"format\":\"raw\""));
        assert!(json.contains("\"derivationPath\":\"m/44'/0'/0'/2'/0'\""));

        let parsed: RegistrySnapshot = serde_json::from_str(&json).unwrap();
        let seed = derive_seed(&parse_mnemonic(ABANDON_ABOUT).unwrap(), "");
        let restored = KeyRegistry::from_stored(seed, &parsed).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.state(KeyId(2)), Some(KeyState::Deleted));
        assert!(!restored.get(dh).unwrap().is_active());
        assert_eq!(restored.watermarks().assertion, 1);

        let material = parsed.keys[1].key_material(None).unwrap();
        assert_eq!(material.public_key(), reg.get(dh).unwrap().public_key());
    }

    #[test]
    fn test_stored_encrypted_private_key() {
        let mut reg = registry();
        reg.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "k").unwrap();
        let storage_key = [0x42u8; 32];
        let snapshot = reg.to_stored(&PrivateKeyPolicy::Encrypted(&storage_key)).unwrap();
        let stored = &snapshot.keys[0];
        assert!(matches!(stored.private_key, StoredPrivateKey::Aes256Gcm { .. }));
        assert!(!format!("{stored:?}").contains(&hex::encode(&reg.records()[0].material().secret_key_bytes()[..])));

        assert!(matches!(
            stored.key_material(None),
            Err(RegistryError::MissingStorageKey)
        ));
        assert!(matches!(
            stored.key_material(Some(&[0u8; 32])),
            Err(RegistryError::Storage(_))
        ));
        let material = stored.key_material(Some(&storage_key)).unwrap();
        assert_eq!(material.public_key(), reg.records()[0].public_key());
    }

    #[test]
    fn test_from_stored_rejects_foreign_seed() {
        let mut reg = registry();
        reg.add_key(KeyUsage::Authentication, CurveType::Signing, "a").unwrap();
        let snapshot = reg.to_stored(&PrivateKeyPolicy::Raw).unwrap();
        let other = Seed::from_bytes([1u8; 64]);
        assert!(matches!(
            KeyRegistry::from_stored(other, &snapshot),
            Err(RegistryError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_shared_registry_concurrent_adds() {
        let shared = SharedRegistry::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    shared
                        .add_key(KeyUsage::Authentication, CurveType::Signing, format!("t{i}"))
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let reg = shared.read();
        assert_eq!(reg.len(), 8);
        let paths: HashSet<_> = reg.records().iter().map(|r| r.derivation_path().clone()).collect();
        assert_eq!(paths.len(), 8);
        reg.check_consistency().unwrap();
    }
}
