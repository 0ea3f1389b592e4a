//! # CLI Interface
//!
//! Defines the command-line argument structure for `keyweave` using
//! `clap` derive.
//!
//! Keys are never stored by the binary. Every command that needs an identity
//! re-derives it from the mnemonic, so the same flags always produce the same
//! keys.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use keyweave_core::identity::KeyUsage;

use crate::logging::LogFormat;

/// Deterministic identity keys from a BIP-39 mnemonic.
#[derive(Parser, Debug)]
#[command(
    name = "keyweave",
    about = "Deterministic identity keys, documents, signatures and encrypted messages",
    version,
    propagate_version = true
)]
pub struct KeyweaveCli {
    /// Log output format. Logs always go to stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate or check a BIP-39 mnemonic.
    #[command(subcommand)]
    Mnemonic(MnemonicCommand),
    /// Derive the identity and print its key records as JSON.
    Keys(KeysArgs),
    /// Print the identity document for the derived keys.
    Document(DocumentArgs),
    /// Sign a message with an authentication or assertion key.
    Sign(SignArgs),
    /// Verify an Ed25519 signature against a public key.
    Verify(VerifyArgs),
    /// Encrypt a message to another identity's key-agreement key.
    Encrypt(EncryptArgs),
    /// Decrypt a message addressed to one of this identity's keys.
    Decrypt(DecryptArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum MnemonicCommand {
    /// Print a fresh mnemonic.
    Generate {
        /// Number of words. Defaults to the configured word count.
        #[arg(long, short = 'w')]
        words: Option<usize>,

        /// Derivation config file (JSON).
        #[arg(long, short = 'c', env = "KEYWEAVE_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Check a mnemonic's words and checksum. Exits non-zero when invalid.
    Validate {
        #[arg(env = "KEYWEAVE_MNEMONIC", hide_env_values = true)]
        phrase: String,
    },
}

/// Where the identity comes from. Shared by every key-using command.
#[derive(Args, Debug, Clone)]
pub struct IdentityArgs {
    /// BIP-39 mnemonic phrase.
    ///
    /// Prefer the environment variable; command-line arguments are visible
    /// to other processes.
    #[arg(long, short = 'm', env = "KEYWEAVE_MNEMONIC", hide_env_values = true)]
    pub mnemonic: String,

    /// Optional BIP-39 passphrase.
    #[arg(
        long,
        env = "KEYWEAVE_PASSPHRASE",
        hide_env_values = true,
        default_value = ""
    )]
    pub passphrase: String,

    /// Derivation config file (JSON). Missing fields take defaults.
    #[arg(long, short = 'c', env = "KEYWEAVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of authentication keys to derive.
    #[arg(long, default_value_t = 1)]
    pub authentication: u32,

    /// Number of assertion keys to derive.
    #[arg(long, default_value_t = 1)]
    pub assertion: u32,

    /// Number of key-agreement keys to derive.
    #[arg(long, default_value_t = 1)]
    pub key_agreement: u32,
}

/// Arguments for `keys`.
#[derive(Args, Debug)]
pub struct KeysArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Hex-encoded 32-byte key used to encrypt private keys in the output.
    ///
    /// Without it private keys are printed in the clear.
    #[arg(long, env = "KEYWEAVE_STORAGE_KEY", hide_env_values = true)]
    pub storage_key: Option<String>,
}

/// Arguments for `document`.
#[derive(Args, Debug)]
pub struct DocumentArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Identity identifier, e.g. `did:example:alice`.
    #[arg(long)]
    pub id: String,

    /// Use identifiers that survive deactivation (`#k<id>`) instead of
    /// positional ones (`#key-<n>`).
    #[arg(long)]
    pub stable_ids: bool,
}

/// The usages that can sign.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningUsage {
    Authentication,
    Assertion,
}

impl SigningUsage {
    /// The identity flag that sets how many keys of this usage exist.
    pub fn count_flag(self) -> &'static str {
        match self {
            SigningUsage::Authentication => "authentication",
            SigningUsage::Assertion => "assertion",
        }
    }
}

impl From<SigningUsage> for KeyUsage {
    fn from(usage: SigningUsage) -> Self {
        match usage {
            SigningUsage::Authentication => KeyUsage::Authentication,
            SigningUsage::Assertion => KeyUsage::Assertion,
        }
    }
}

/// A message given inline or read from a file.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct MessageInput {
    /// Message text.
    #[arg(long)]
    pub message: Option<String>,

    /// Read the message bytes from a file.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// Arguments for `sign`.
#[derive(Args, Debug)]
pub struct SignArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    #[command(flatten)]
    pub input: MessageInput,

    /// Which kind of key signs.
    #[arg(long, value_enum, default_value_t = SigningUsage::Authentication)]
    pub usage: SigningUsage,

    /// Derivation index of the signing key within its usage.
    #[arg(long, default_value_t = 0)]
    pub index: u32,
}

/// Arguments for `verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub input: MessageInput,

    /// Signer public key, hex or multibase (`z...`).
    #[arg(long)]
    pub public_key: String,

    /// Hex-encoded 64-byte signature.
    #[arg(long)]
    pub signature: String,
}

/// Arguments for `encrypt`.
#[derive(Args, Debug)]
pub struct EncryptArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    #[command(flatten)]
    pub input: MessageInput,

    /// Recipient X25519 public key, hex or multibase (`z...`).
    #[arg(long)]
    pub to: String,

    /// Derivation index of the sender's key-agreement key.
    #[arg(long, default_value_t = 0)]
    pub index: u32,
}

/// Arguments for `decrypt`.
#[derive(Args, Debug)]
pub struct DecryptArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// File holding the encrypted message JSON. Reads stdin when omitted.
    #[arg(long)]
    pub input: Option<PathBuf>,
}
