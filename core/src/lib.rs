// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # keyweave Core Library
//!
//! Deterministic identity keys from a single mnemonic, and everything you
//! do with them: publish them, sign with them, and talk privately through
//! them.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants and the derivation layout.
//! - **crypto**: Key types, Ed25519 signatures, X25519 agreement,
//!   AES-256-GCM, hashes. Thin wrappers over audited crates.
//! - **identity**: Mnemonic → seed → SLIP-0010 keys → registry →
//!   identity document.
//! - **messaging**: End-to-end encrypted envelopes between agreement keys.
//! - **error**: [`CoreError`], the union of the per-module errors.
//!
//! ## Flow
//!
//! ```text
//! mnemonic ─► seed ─► derivation ─► registry ─┬─► document
//!                                             ├─► sign / verify
//!                                             └─► agreement ─► message cipher
//! ```
//!
//! ## Example
//!
//! ```
//! use keyweave_core::config::DerivationConfig;
//! use keyweave_core::crypto::CurveType;
//! use keyweave_core::identity::{build_document, generate_mnemonic, KeyRegistry, KeyUsage};
//!
//! let mnemonic = generate_mnemonic(24)?;
//! let mut registry = KeyRegistry::from_mnemonic(&mnemonic, "", DerivationConfig::default())?;
//! registry.add_key(KeyUsage::Authentication, CurveType::Signing, "login")?;
//! registry.add_key(KeyUsage::KeyAgreement, CurveType::Agreement, "inbox")?;
//!
//! let doc = build_document("did:example:alice", &registry);
//! assert_eq!(doc.verification_method.len(), 2);
//! # Ok::<(), keyweave_core::CoreError>(())
//! ```
//!
//! ## Design Philosophy
//!
//! 1. Same mnemonic, same keys, on every machine.
//! 2. No key bytes in logs, errors or `Debug` output.
//! 3. Verification is a predicate; decryption failures are typed.
//! 4. No `unsafe`.

#![forbid(unsafe_code)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod messaging;

pub use error::{CoreError, Result};
