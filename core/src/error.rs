//! Crate-level error type.
//!
//! Each module has its own error enum. [`CoreError`] wraps them so callers
//! that cross module boundaries can use one `?`-friendly type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::crypto::{AgreementError, KeyError};
use crate::identity::{DerivationError, DocumentError, RegistryError, SeedError};
use crate::messaging::MessageError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Agreement(#[from] AgreementError),

    #[error(transparent)]
    Message(#[from] MessageError),
}

impl CoreError {
    /// `true` for a failed decryption, as opposed to bad local input.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, CoreError::Message(MessageError::DecryptionFailed(_)))
    }
}

/// Result alias over [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
