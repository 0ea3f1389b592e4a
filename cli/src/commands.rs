//! Subcommand implementations.
//!
//! Each command returns the text it would print so the logic can be tested
//! without capturing stdout. `main` does the printing.

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::io::Read;
use std::path::Path;

use keyweave_core::config::{DerivationConfig, AES_KEY_LENGTH};
use keyweave_core::crypto::{
    sign, verify, AgreementPublicKey, CurveType, PublicKey, Signature, SigningPublicKey,
};
use keyweave_core::identity::{
    generate_mnemonic, parse_mnemonic, validate_mnemonic, DocumentBuilder, KeyIdScheme,
    KeyRegistry, KeyRequest, KeyUsage, PrivateKeyPolicy,
};
use keyweave_core::messaging::{decrypt_for, encrypt, EncryptedMessage};

use crate::cli::{
    DecryptArgs, DocumentArgs, EncryptArgs, IdentityArgs, KeysArgs, MessageInput, MnemonicCommand,
    SignArgs, VerifyArgs,
};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load a derivation config file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<DerivationConfig> {
    let config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            DerivationConfig::from_json(&json)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => DerivationConfig::default(),
    };
    config.validate().context("invalid derivation config")?;
    Ok(config)
}

/// Key name used for the `index`-th key of `usage`.
pub fn key_name(usage: KeyUsage, index: u32) -> String {
    format!("{usage}-{index}")
}

/// Re-derive the identity described by `args`.
///
/// Keys are added usage by usage, so a key's derivation index equals its
/// position within its usage.
pub fn build_registry(args: &IdentityArgs) -> Result<KeyRegistry> {
    let config = load_config(args.config.as_deref())?;
    let mnemonic = parse_mnemonic(&args.mnemonic).context("invalid mnemonic")?;
    let mut registry = KeyRegistry::from_mnemonic(&mnemonic, &args.passphrase, config)?;

    let counts = [
        (KeyUsage::Authentication, args.authentication),
        (KeyUsage::Assertion, args.assertion),
        (KeyUsage::KeyAgreement, args.key_agreement),
    ];
    let requests: Vec<KeyRequest> = counts
        .iter()
        .flat_map(|&(usage, count)| (0..count).map(move |i| KeyRequest::new(usage, key_name(usage, i))))
        .collect();
    registry.add_keys(&requests)?;

    tracing::debug!(keys = registry.len(), "identity derived");
    Ok(registry)
}

fn read_message(input: &MessageInput) -> Result<Vec<u8>> {
    match (&input.message, &input.file) {
        (Some(text), _) => Ok(text.as_bytes().to_vec()),
        (None, Some(path)) => std::fs::read(path)
            .with_context(|| format!("failed to read message file {}", path.display())),
        (None, None) => bail!("either --message or --file is required"),
    }
}

/// Accepts hex or multibase. Bare hex carries no curve, so the caller says
/// which one it expects.
fn parse_public_key(s: &str, curve: CurveType) -> Result<PublicKey> {
    let key = if s.starts_with('z') {
        PublicKey::from_multibase(s).context("invalid multibase public key")?
    } else {
        match curve {
            CurveType::Signing => SigningPublicKey::from_hex(s).map(PublicKey::Signing),
            CurveType::Agreement => AgreementPublicKey::from_hex(s).map(PublicKey::Agreement),
        }
        .context("invalid hex public key")?
    };
    if key.curve_type() != curve {
        bail!("expected a {} public key, got a {} key", curve.algorithm(), key.curve_type().algorithm());
    }
    Ok(key)
}

fn parse_storage_key(s: &str) -> Result<[u8; AES_KEY_LENGTH]> {
    let bytes = hex::decode(s).context("storage key is not hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("storage key must be {AES_KEY_LENGTH} bytes"))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn mnemonic(cmd: &MnemonicCommand) -> Result<String> {
    match cmd {
        MnemonicCommand::Generate { words, config } => {
            let word_count = match words {
                Some(n) => *n,
                None => load_config(config.as_deref())?.word_count,
            };
            let mnemonic = generate_mnemonic(word_count)?;
            Ok(mnemonic.phrase().to_string())
        }
        MnemonicCommand::Validate { phrase } => {
            if validate_mnemonic(phrase) {
                Ok("valid".to_string())
            } else {
                bail!("invalid mnemonic")
            }
        }
    }
}

pub fn keys(args: &KeysArgs) -> Result<String> {
    let registry = build_registry(&args.identity)?;
    let storage_key = args.storage_key.as_deref().map(parse_storage_key).transpose()?;
    let policy = match &storage_key {
        Some(key) => PrivateKeyPolicy::Encrypted(key),
        None => {
            tracing::warn!("no storage key given, private keys are exported unencrypted");
            PrivateKeyPolicy::Raw
        }
    };
    let snapshot = registry.to_stored(&policy)?;
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

pub fn document(args: &DocumentArgs) -> Result<String> {
    let registry = build_registry(&args.identity)?;
    let scheme = if args.stable_ids {
        KeyIdScheme::Stable
    } else {
        KeyIdScheme::Positional
    };
    let doc = DocumentBuilder::with_scheme(scheme).build(&args.id, &registry);
    doc.validate()?;
    Ok(doc.to_json_pretty()?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignOutput {
    key_name: String,
    public_key: String,
    public_key_multibase: String,
    signature: String,
}

pub fn sign_message(args: &SignArgs) -> Result<String> {
    let registry = build_registry(&args.identity)?;
    let name = key_name(args.usage.into(), args.index);
    let record = registry
        .find_by_name(&name)
        .ok_or_else(|| anyhow!("no {name} key; raise --{} to derive it", args.usage.count_flag()))?;
    let signer = record
        .material()
        .as_signing()
        .ok_or_else(|| anyhow!("{name} is not a signing key"))?;

    let message = read_message(&args.input)?;
    let signature = sign(signer, &message);
    let public_key = signer.public_key();

    let output = SignOutput {
        key_name: name,
        public_key: public_key.to_hex(),
        public_key_multibase: public_key.to_multibase(),
        signature: signature.to_hex(),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Returns whether the signature verified. The printed text says the same.
pub fn verify_message(args: &VerifyArgs) -> Result<bool> {
    let PublicKey::Signing(public_key) = parse_public_key(&args.public_key, CurveType::Signing)? else {
        bail!("signer key must be an Ed25519 key");
    };
    let signature = Signature::from_hex(&args.signature).context("invalid signature")?;
    let message = read_message(&args.input)?;
    Ok(verify(&public_key, &message, &signature))
}

pub fn encrypt_message(args: &EncryptArgs) -> Result<String> {
    let registry = build_registry(&args.identity)?;
    let name = key_name(KeyUsage::KeyAgreement, args.index);
    let sender = registry
        .find_by_name(&name)
        .and_then(|r| r.material().as_agreement())
        .ok_or_else(|| anyhow!("no {name} key; raise --key-agreement to derive it"))?;

    let PublicKey::Agreement(recipient) = parse_public_key(&args.to, CurveType::Agreement)? else {
        bail!("recipient key must be an X25519 key");
    };

    let message = read_message(&args.input)?;
    let envelope = encrypt(&message, sender, &recipient)?;
    Ok(envelope.to_json()?)
}

pub fn decrypt_message(args: &DecryptArgs) -> Result<Vec<u8>> {
    let registry = build_registry(&args.identity)?;
    let json = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read message file {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read message from stdin")?;
            buf
        }
    };
    let envelope = EncryptedMessage::from_json(json.trim())?;
    Ok(decrypt_for(&registry, &envelope)?)
}

pub fn version() -> String {
    format!(
        "keyweave {}\nmessage   {}\nsigning   {}\ncipher    {}",
        env!("CARGO_PKG_VERSION"),
        keyweave_core::config::MESSAGE_ALGORITHM_ID,
        keyweave_core::config::SIGNING_ALGORITHM,
        keyweave_core::config::SYMMETRIC_ALGORITHM,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Commands, KeyweaveCli};
    use clap::Parser;
    use keyweave_core::identity::derive_seed;
    use std::io::Write;

    const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";

    fn parse(args: &[&str]) -> Commands {
        let argv = [&["keyweave"][..], args].concat();
        KeyweaveCli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn test_build_registry_matches_derivation_vectors() {
        let Commands::Document(args) = parse(&["document", "--mnemonic", ABANDON_ABOUT, "--id", "did:example:v"])
        else {
            panic!("expected document");
        };
        let registry = build_registry(&args.identity).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.find_by_name("authentication-0").unwrap().public_key().to_hex(),
            "7c2e79f3a1701fb2a86a2c24a3fdf8634b7aad80886c0c0a526d44d23fe8e19a"
        );
        assert_eq!(
            registry.find_by_name("keyAgreement-0").unwrap().public_key().to_hex(),
            "cc96f5139f823b97efa6837553aff4184e99ee2b0978af631157726e5528873c"
        );
    }

    #[test]
    fn test_config_file_changes_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"coinType": 1}}"#).unwrap();
        let path = file.path().to_str().unwrap();

        let default = parse(&["keys", "--mnemonic", ABANDON_ABOUT]);
        let custom = parse(&["keys", "--mnemonic", ABANDON_ABOUT, "--config", path]);
        let (Commands::Keys(default), Commands::Keys(custom)) = (default, custom) else {
            panic!("expected keys");
        };
        let a = build_registry(&default.identity).unwrap();
        let b = build_registry(&custom.identity).unwrap();
        assert_ne!(a.records()[0].public_key(), b.records()[0].public_key());
        assert_eq!(b.config().coin_type, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"wordCount": 13}}"#).unwrap();
        assert!(load_config(Some(file.path())).is_err());
        assert!(load_config(None).is_ok());
    }

    #[test]
    fn test_sign_then_verify() {
        let Commands::Sign(args) = parse(&["sign", "--mnemonic", ABANDON_ABOUT, "--message", "hello"]) else {
            panic!("expected sign");
        };
        let out: serde_json::Value = serde_json::from_str(&sign_message(&args).unwrap()).unwrap();
        let multibase = out["publicKeyMultibase"].as_str().unwrap();
        let signature = out["signature"].as_str().unwrap();

        let Commands::Verify(ok) = parse(&[
            "verify", "--public-key", multibase, "--signature", signature, "--message", "hello",
        ]) else {
            panic!("expected verify");
        };
        assert!(verify_message(&ok).unwrap());

        let Commands::Verify(tampered) = parse(&[
            "verify", "--public-key", multibase, "--signature", signature, "--message", "hellO",
        ]) else {
            panic!("expected verify");
        };
        assert!(!verify_message(&tampered).unwrap());
    }

    #[test]
    fn test_sign_with_missing_key_fails() {
        let Commands::Sign(args) = parse(&[
            "sign", "--mnemonic", ABANDON_ABOUT, "--usage", "assertion", "--index", "3", "--message", "x",
        ]) else {
            panic!("expected sign");
        };
        let err = sign_message(&args).unwrap_err().to_string();
        assert!(err.contains("assertion-3"));
    }

    #[test]
    fn test_encrypt_decrypt_between_identities() {
        let bob_phrase = generate_mnemonic(12).unwrap().phrase().to_string();
        let Commands::Keys(bob_keys) = parse(&["keys", "--mnemonic", &bob_phrase]) else {
            panic!("expected keys");
        };
        let bob = build_registry(&bob_keys.identity).unwrap();
        let bob_inbox = bob.find_by_name("keyAgreement-0").unwrap().public_key().to_multibase();

        let Commands::Encrypt(args) = parse(&[
            "encrypt", "--mnemonic", ABANDON_ABOUT, "--to", &bob_inbox, "--message", "meet at 6",
        ]) else {
            panic!("expected encrypt");
        };
        let envelope = encrypt_message(&args).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(envelope.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap();

        let Commands::Decrypt(args) = parse(&["decrypt", "--mnemonic", &bob_phrase, "--input", path]) else {
            panic!("expected decrypt");
        };
        assert_eq!(decrypt_message(&args).unwrap(), b"meet at 6");

        // The sender is not the recipient.
        let Commands::Decrypt(args) = parse(&["decrypt", "--mnemonic", ABANDON_ABOUT, "--input", path]) else {
            panic!("expected decrypt");
        };
        assert!(decrypt_message(&args).is_err());
    }

    #[test]
    fn test_keys_encrypted_export_restores() {
        let storage_key = hex::encode([5u8; 32]);
        let Commands::Keys(args) = parse(&[
            "keys", "--mnemonic", ABANDON_ABOUT, "--storage-key", &storage_key,
        ]) else {
            panic!("expected keys");
        };
        let json = keys(&args).unwrap();
        assert!(!json.contains("\"raw\""));

        let snapshot: keyweave_core::identity::RegistrySnapshot = serde_json::from_str(&json).unwrap();
        let mnemonic = parse_mnemonic(ABANDON_ABOUT).unwrap();
        let restored = KeyRegistry::from_stored(derive_seed(&mnemonic, ""), &snapshot).unwrap();
        assert_eq!(restored.len(), 3);
        for stored in &snapshot.keys {
            stored.key_material(Some(&[5u8; 32])).unwrap();
        }
    }

    #[test]
    fn test_public_key_curve_checked() {
        let registry = {
            let Commands::Keys(args) = parse(&["keys", "--mnemonic", ABANDON_ABOUT]) else {
                panic!("expected keys");
            };
            build_registry(&args.identity).unwrap()
        };
        let inbox = registry.find_by_name("keyAgreement-0").unwrap().public_key();
        assert!(parse_public_key(&inbox.to_multibase(), CurveType::Signing).is_err());
        assert_eq!(parse_public_key(&inbox.to_hex(), CurveType::Agreement).unwrap(), inbox);
        assert!(parse_public_key("abc", CurveType::Agreement).is_err());
    }

    #[test]
    fn test_storage_key_length_checked() {
        assert!(parse_storage_key("abcd").is_err());
        assert!(parse_storage_key("not hex").is_err());
        assert_eq!(parse_storage_key(&hex::encode([1u8; 32])).unwrap(), [1u8; 32]);
    }

    #[test]
    fn test_mnemonic_commands() {
        let phrase = mnemonic(&MnemonicCommand::Generate { words: Some(15), config: None }).unwrap();
        assert_eq!(phrase.split_whitespace().count(), 15);
        assert_eq!(mnemonic(&MnemonicCommand::Validate { phrase }).unwrap(), "valid");
        assert!(mnemonic(&MnemonicCommand::Validate { phrase: "abandon abandon".into() }).is_err());

        let default = mnemonic(&MnemonicCommand::Generate { words: None, config: None }).unwrap();
        assert_eq!(default.split_whitespace().count(), 24);
    }

    #[test]
    fn test_document_stable_ids() {
        let Commands::Document(args) = parse(&[
            "document", "--mnemonic", ABANDON_ABOUT, "--id", "did:example:v", "--stable-ids",
        ]) else {
            panic!("expected document");
        };
        let json = document(&args).unwrap();
        assert!(json.contains("did:example:v#k0"));
        assert!(json.contains("did:example:v#k2"));
    }

    #[test]
    fn test_version_lists_algorithms() {
        let out = version();
        assert!(out.starts_with(&format!("keyweave {}", env!("CARGO_PKG_VERSION"))));
        assert!(out.contains("X25519-BLAKE3-AES256GCM-v1"));
        assert!(out.contains("Ed25519"));
        assert!(out.contains("cipher    AES-256-GCM"));
    }
}
