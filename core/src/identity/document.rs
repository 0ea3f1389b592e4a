//! # Identity Documents
//!
//! Projects the active keys of a [`KeyRegistry`] into a DID-Core-shaped
//! JSON document. The document is derived, never authored: it is a pure
//! function of the identity id and the active records in registry order.
//!
//! ```json
//! {
//!   "@context": ["https://www.w3.org/ns/did/v1", "..."],
//!   "id": "did:example:alice",
//!   "verificationMethod": [
//!     { "id": "did:example:alice#key-1", "type": "Ed25519VerificationKey2020",
//!       "controller": "did:example:alice", "publicKeyMultibase": "z6Mk..." }
//!   ],
//!   "authentication": ["did:example:alice#key-1"]
//! }
//! ```
//!
//! A usage list with no entries is left out entirely. There is no
//! `created` timestamp; two builds of an unchanged registry serialize to
//! the same bytes.
//!
//! ## Key identifiers
//!
//! [`KeyIdScheme::Positional`] (the default) numbers active keys `#key-1`,
//! `#key-2`, ... in registry order. Deactivating or inserting a key renumbers
//! every key after it, so these fragments are not stable references.
//! [`KeyIdScheme::Stable`] uses the permanent [`KeyId`](super::registry::KeyId)
//! instead (`#k0`, `#k3`, ...), which survives any registry mutation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use super::registry::{KeyRecord, KeyRegistry, KeyUsage};
use crate::crypto::keys::{CurveType, PublicKey};

/// Context URI for DID Core.
pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// Context URI for the Ed25519 2020 suite.
pub const ED25519_CONTEXT: &str = "https://w3id.org/security/suites/ed25519-2020/v1";

/// Context URI for the X25519 2020 suite.
pub const X25519_CONTEXT: &str = "https://w3id.org/security/suites/x25519-2020/v1";

/// Verification method type for signing keys.
pub const ED25519_VERIFICATION_KEY_TYPE: &str = "Ed25519VerificationKey2020";

/// Verification method type for agreement keys.
pub const X25519_KEY_AGREEMENT_TYPE: &str = "X25519KeyAgreementKey2020";

/// Errors from document parsing and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("invalid document: {0}")]
    InvalidFormat(String),

    #[error("invalid public key in verification method {0}")]
    InvalidPublicKey(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// How verification method fragments are assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyIdScheme {
    /// `#key-N`, N counting active keys from 1.
    #[default]
    Positional,
    /// `#k{KeyId}`.
    Stable,
}

/// Builds [`IdentityDocument`]s from registry records.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentBuilder {
    scheme: KeyIdScheme,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheme(scheme: KeyIdScheme) -> Self {
        Self { scheme }
    }

    /// Project the active keys of `registry`.
    pub fn build(&self, identity_id: &str, registry: &KeyRegistry) -> IdentityDocument {
        self.build_from_records(identity_id, registry.active_records())
    }

    /// Project an explicit sequence of records. Inactive records are
    /// skipped; order is preserved.
    pub fn build_from_records<'a>(
        &self,
        identity_id: &str,
        records: impl IntoIterator<Item = &'a KeyRecord>,
    ) -> IdentityDocument {
        let mut doc = IdentityDocument {
            context: vec![DID_CONTEXT.to_string()],
            id: identity_id.to_string(),
            verification_method: Vec::new(),
            authentication: Vec::new(),
            assertion_method: Vec::new(),
            key_agreement: Vec::new(),
        };
        let mut has_signing = false;
        let mut has_agreement = false;

        for (position, record) in records.into_iter().filter(|r| r.is_active()).enumerate() {
            let fragment = match self.scheme {
                KeyIdScheme::Positional => format!("key-{}", position + 1),
                KeyIdScheme::Stable => format!("k{}", record.id()),
            };
            let method_id = format!("{identity_id}#{fragment}");

            let public_key = record.public_key();
            let type_ = match public_key.curve_type() {
                CurveType::Signing => {
                    has_signing = true;
                    ED25519_VERIFICATION_KEY_TYPE
                }
                CurveType::Agreement => {
                    has_agreement = true;
                    X25519_KEY_AGREEMENT_TYPE
                }
            };

            doc.verification_method.push(VerificationMethod {
                id: method_id.clone(),
                type_: type_.to_string(),
                controller: identity_id.to_string(),
                public_key_multibase: public_key.to_multibase(),
            });

            match record.usage() {
                KeyUsage::Authentication => doc.authentication.push(method_id),
                KeyUsage::Assertion => doc.assertion_method.push(method_id),
                KeyUsage::KeyAgreement => doc.key_agreement.push(method_id),
            }
        }

        if has_signing {
            doc.context.push(ED25519_CONTEXT.to_string());
        }
        if has_agreement {
            doc.context.push(X25519_CONTEXT.to_string());
        }

        debug!(
            id = identity_id,
            methods = doc.verification_method.len(),
            scheme = ?self.scheme,
            "identity document built"
        );
        doc
    }
}

/// Build a document with positional identifiers.
pub fn build_document(identity_id: &str, registry: &KeyRegistry) -> IdentityDocument {
    DocumentBuilder::new().build(identity_id, registry)
}

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// An identity document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    pub id: String,

    #[serde(rename = "verificationMethod")]
    pub verification_method: Vec<VerificationMethod>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<String>,

    #[serde(
        rename = "assertionMethod",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub assertion_method: Vec<String>,

    #[serde(rename = "keyAgreement", default, skip_serializing_if = "Vec::is_empty")]
    pub key_agreement: Vec<String>,
}

impl IdentityDocument {
    /// Compact JSON.
    pub fn to_json(&self) -> Result<String, DocumentError> {
        serde_json::to_string(self).map_err(|e| DocumentError::Serialization(e.to_string()))
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        serde_json::to_string_pretty(self).map_err(|e| DocumentError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(json).map_err(|e| DocumentError::Serialization(e.to_string()))
    }

    /// Look up a verification method by its full id (`did:...#key-1`) or by
    /// fragment alone (`#key-1` or `key-1`). A full id naming another
    /// document never matches by fragment.
    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        let fragment = match id.rsplit_once('#') {
            None => Some(id),
            Some((prefix, f)) if prefix.is_empty() || prefix == self.id => Some(f),
            Some(_) => None,
        };
        self.verification_method.iter().find(|vm| {
            vm.id == id
                || fragment.is_some_and(|fragment| {
                    vm.id.rsplit_once('#').is_some_and(|(_, f)| f == fragment)
                })
        })
    }

    /// Structural checks:
    ///
    /// - `id` is non-empty and the DID Core context is present
    /// - verification method ids are unique and controlled by `id`
    /// - every method has a known type and a decodable key of that type
    /// - every usage reference points at a method of the right type
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.id.is_empty() {
            return Err(DocumentError::InvalidFormat("document id is empty".into()));
        }
        if !self.context.iter().any(|c| c == DID_CONTEXT) {
            return Err(DocumentError::InvalidFormat(
                "document must include DID Core context".into(),
            ));
        }

        let mut ids = HashSet::new();
        for vm in &self.verification_method {
            if !ids.insert(vm.id.as_str()) {
                return Err(DocumentError::InvalidFormat(format!(
                    "duplicate verification method {}",
                    vm.id
                )));
            }
            if vm.controller != self.id {
                return Err(DocumentError::InvalidFormat(format!(
                    "verification method {} has foreign controller",
                    vm.id
                )));
            }
            vm.public_key()?;
        }

        let relations = [
            ("authentication", &self.authentication, CurveType::Signing),
            ("assertionMethod", &self.assertion_method, CurveType::Signing),
            ("keyAgreement", &self.key_agreement, CurveType::Agreement),
        ];
        for (relation, refs, curve) in relations {
            for reference in refs {
                let vm = self
                    .verification_method
                    .iter()
                    .find(|vm| &vm.id == reference)
                    .ok_or_else(|| {
                        DocumentError::InvalidFormat(format!(
                            "{relation} references unknown method {reference}"
                        ))
                    })?;
                if vm.public_key()?.curve_type() != curve {
                    return Err(DocumentError::InvalidFormat(format!(
                        "{relation} references {reference}, which is the wrong key type"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One key entry in an [`IdentityDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMethod {
    pub id: String,

    #[serde(rename = "type")]
    pub type_: String,

    pub controller: String,

    /// `z` + base58btc over multicodec prefix and raw key.
    #[serde(rename = "publicKeyMultibase")]
    pub public_key_multibase: String,
}

impl VerificationMethod {
    /// Decode the public key, checking it against the declared type.
    pub fn public_key(&self) -> Result<PublicKey, DocumentError> {
        let invalid = || DocumentError::InvalidPublicKey(self.id.clone());
        let key = PublicKey::from_multibase(&self.public_key_multibase).map_err(|_| invalid())?;
        let declared = match self.type_.as_str() {
            ED25519_VERIFICATION_KEY_TYPE => CurveType::Signing,
            X25519_KEY_AGREEMENT_TYPE => CurveType::Agreement,
            _ => return Err(invalid()),
        };
        if key.curve_type() != declared {
            return Err(invalid());
        }
        Ok(key)
    }
}
