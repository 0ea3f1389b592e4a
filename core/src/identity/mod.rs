//! # Identity Module
//!
//! Everything between a mnemonic and a published identity document.
//!
//! The stack is layered, each step a pure function of the one before:
//!
//! 1. **Seed**: BIP-39 mnemonic in, 64-byte seed out.
//! 2. **Derivation**: SLIP-0010 walk from the seed to a per-path Ed25519
//!    or X25519 keypair.
//! 3. **Registry**: the identity's keys, each with a permanent id, a usage,
//!    an active flag and the path it was derived at.
//! 4. **Document**: the active keys projected into a DID-Core-shaped JSON
//!    document.
//!
//! ## Design Decisions
//!
//! - Key paths are `m/44'/{coin}'/{account}'/{usage}'/{index}'`. The usage
//!   fixes the curve, so the path doesn't need a curve level.
//! - The mnemonic is never stored. The registry keeps only the seed, and
//!   only in memory.
//! - Documents carry no timestamp, so rebuilding one is idempotent.

pub mod derivation;
pub mod document;
pub mod registry;
pub mod seed;

pub use derivation::{derive_key_at, derive_key_for, ChildIndex, DerivationError, DerivationPath};
pub use document::{
    build_document, DocumentBuilder, DocumentError, IdentityDocument, KeyIdScheme,
    VerificationMethod,
};
pub use registry::{
    IndexWatermarks, KeyId, KeyRecord, KeyRegistry, KeyRequest, KeyState, KeyUsage,
    PrivateKeyPolicy, RegistryError, RegistrySnapshot, SharedRegistry, StoredKeyRecord,
    StoredPrivateKey,
};
pub use seed::{derive_seed, generate_mnemonic, parse_mnemonic, validate_mnemonic, Mnemonic, Seed, SeedError};
