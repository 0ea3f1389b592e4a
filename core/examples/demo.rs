//! Interactive walkthrough of the keyweave identity lifecycle.
//!
//! Creates two identities from fresh mnemonics, publishes their documents,
//! signs a login challenge, exchanges an encrypted message, then rotates
//! one identity's mnemonic and shows what survives.
//!
//! Run with:
//!   cargo run --example demo --release

use std::time::Instant;

use keyweave_core::config::DerivationConfig;
use keyweave_core::crypto::signatures::{sign, verify};
use keyweave_core::crypto::PublicKey;
use keyweave_core::identity::{
    build_document, generate_mnemonic, KeyId, KeyRegistry, KeyRequest, KeyUsage, Mnemonic,
};
use keyweave_core::messaging::{decrypt_for, encrypt};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";
const RED: &str = "\x1b[31m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!("{BG_BLUE}{BOLD}{WHITE}                                                            {RESET}");
    println!("{BG_BLUE}{BOLD}{WHITE}    KEYWEAVE  --  Identity Lifecycle Walkthrough            {RESET}");
    println!("{BG_BLUE}{BOLD}{WHITE}    BIP-39 + SLIP-0010 | Ed25519 + X25519 | AES-256-GCM     {RESET}");
    println!("{BG_BLUE}{BOLD}{WHITE}                                                            {RESET}");
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!("{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]================================================{RESET}");
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!("{CYAN}------------------------------------------------------------{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn failure(text: &str) {
    println!("{RED}  [REJECTED] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: std::time::Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

fn short(s: &str) -> String {
    if s.len() <= 20 {
        return s.to_string();
    }
    format!("{}...{}", &s[..10], &s[s.len() - 8..])
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_identity(mnemonic: &Mnemonic) -> KeyRegistry {
    let mut registry = KeyRegistry::from_mnemonic(mnemonic, "", DerivationConfig::default())
        .expect("default config is valid");
    registry
        .add_keys(&[
            KeyRequest::new(KeyUsage::Authentication, "login"),
            KeyRequest::new(KeyUsage::Assertion, "credentials"),
            KeyRequest::new(KeyUsage::KeyAgreement, "inbox"),
        ])
        .expect("fresh registry accepts keys");
    registry
}

fn main() {
    banner();

    // -- 1. Mnemonics -------------------------------------------------------
    section(1, "Generate recovery phrases");
    let start = Instant::now();
    let alice_words = generate_mnemonic(24).expect("24 words is supported");
    let bob_words = generate_mnemonic(12).expect("12 words is supported");
    timing("two mnemonics", start.elapsed());
    info("alice", &format!("{} words", alice_words.word_count()));
    info("bob", &format!("{} words", bob_words.word_count()));

    // -- 2. Registries -------------------------------------------------------
    section(2, "Derive keys");
    let start = Instant::now();
    let mut alice = new_identity(&alice_words);
    let bob = new_identity(&bob_words);
    timing("seed stretch + 6 derivations", start.elapsed());
    for record in alice.records() {
        info(
            &format!("alice {}", record.name()),
            &format!("{} {}", record.derivation_path(), record.fingerprint()),
        );
    }

    // -- 3. Documents --------------------------------------------------------
    section(3, "Publish identity documents");
    let alice_doc = build_document("did:example:alice", &alice);
    alice_doc.validate().expect("built documents validate");
    println!(
        "{DIM}{}{RESET}",
        alice_doc.to_json_pretty().expect("documents serialize")
    );
    success("document validates");

    // -- 4. Signing ----------------------------------------------------------
    section(4, "Sign a login challenge");
    let challenge = b"nonce=91ac; aud=https://rp.example";
    let signer = alice
        .find_by_name("login")
        .and_then(|r| r.material().as_signing())
        .expect("login is a signing key");
    let signature = sign(signer, challenge);
    info("signature", &short(&signature.to_hex()));

    let vm = alice_doc
        .verification_method(&alice_doc.authentication[0])
        .expect("authentication key is listed");
    match vm.public_key() {
        Ok(PublicKey::Signing(pk)) if verify(&pk, challenge, &signature) => {
            success("relying party verified the signature from the document")
        }
        _ => failure("signature did not verify"),
    }

    // -- 5. Messaging --------------------------------------------------------
    section(5, "Send bob an encrypted message");
    let alice_inbox = alice
        .find_by_name("inbox")
        .and_then(|r| r.material().as_agreement())
        .expect("inbox is an agreement key");
    let bob_inbox = bob
        .find_by_name("inbox")
        .and_then(|r| r.material().as_agreement())
        .map(|kp| kp.public_key())
        .expect("inbox is an agreement key");
    let message = encrypt(b"the demo works", alice_inbox, &bob_inbox).expect("agreement succeeds");
    info("ciphertext", &short(&message.ciphertext));
    match decrypt_for(&bob, &message) {
        Ok(plaintext) => success(&format!("bob read: {}", String::from_utf8_lossy(&plaintext))),
        Err(e) => failure(&e.to_string()),
    }
    match decrypt_for(&alice, &message) {
        Ok(_) => failure("alice should not be able to read bob's mail"),
        Err(e) => success(&format!("alice cannot read it: {e}")),
    }

    // -- 6. Rotation ---------------------------------------------------------
    section(6, "Deactivate, then rotate");
    alice.set_active(KeyId(1), false).expect("key 1 exists");
    let doc = build_document("did:example:alice", &alice);
    info("assertion methods", &doc.assertion_method.len().to_string());

    let before = alice.records()[0].public_key();
    let rotated = generate_mnemonic(24).expect("24 words is supported");
    let start = Instant::now();
    alice.regenerate_all(&rotated, "").expect("rotation succeeds");
    timing("regenerate_all", start.elapsed());
    info("login before", &short(&before.to_hex()));
    info("login after", &short(&alice.records()[0].public_key().to_hex()));
    info("watermarks", &format!("{:?}", alice.watermarks()));
    alice.check_consistency().expect("rotation keeps the registry consistent");
    success("same ids, same paths, same activation flags, new keys");

    println!();
}
