// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # keyweave
//!
//! Entry point for the `keyweave` binary. Parses CLI arguments, initializes
//! logging, and runs one command against an identity re-derived from its
//! mnemonic.
//!
//! - `mnemonic generate|validate`: create or check a recovery phrase
//! - `keys`: print the key records, private keys raw or encrypted
//! - `document`: print the identity document
//! - `sign` / `verify`: Ed25519 signatures
//! - `encrypt` / `decrypt`: end-to-end messages between agreement keys
//! - `version`: print build version information
//!
//! Command output goes to stdout; logs go to stderr.

mod cli;
mod commands;
mod logging;

use anyhow::Result;
use clap::Parser;
use std::io::Write;
use std::process::ExitCode;

use cli::{Commands, KeyweaveCli};

fn main() -> Result<ExitCode> {
    let cli = KeyweaveCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);

    match cli.command {
        Commands::Mnemonic(cmd) => println!("{}", commands::mnemonic(&cmd)?),
        Commands::Keys(args) => println!("{}", commands::keys(&args)?),
        Commands::Document(args) => println!("{}", commands::document(&args)?),
        Commands::Sign(args) => println!("{}", commands::sign_message(&args)?),
        Commands::Verify(args) => {
            let valid = commands::verify_message(&args)?;
            println!("{}", if valid { "valid" } else { "invalid" });
            if !valid {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Encrypt(args) => println!("{}", commands::encrypt_message(&args)?),
        Commands::Decrypt(args) => {
            let plaintext = commands::decrypt_message(&args)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&plaintext)?;
            stdout.flush()?;
        }
        Commands::Version => println!("{}", commands::version()),
    }

    Ok(ExitCode::SUCCESS)
}
