//! `chartseal` CLI for key management and offline audit verification.

#![warn(clippy::pedantic, clippy::nursery)]

use chartseal::audit::verify_entry;
use chartseal::codec::FieldCodec;
use chartseal::keyring::{self, CipherKey, CIPHER_KEY_ENV};
use chartseal::signer::AuditVerifier;
use chartseal::store::Document;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "chartseal")]
#[command(about = "Chartseal key management and audit verification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a cipher key and an audit signing keypair
    Keygen {
        /// Output directory for key files
        #[arg(short, long, default_value = "./keys")]
        output: PathBuf,
    },
    /// Verify the signature of an exported audit entry
    Verify {
        /// JSON file holding the stored entry document
        entry: PathBuf,
        /// Public key PEM file of the audit signer
        #[arg(long)]
        public_key: PathBuf,
        /// Symmetric key material (defaults to the environment variable)
        #[arg(long)]
        cipher_key: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, String> {
    match command {
        Commands::Keygen { output } => keygen(&output),
        Commands::Verify { entry, public_key, cipher_key } => {
            verify(&entry, &public_key, cipher_key.as_deref())
        }
    }
}

fn keygen(output: &PathBuf) -> Result<ExitCode, String> {
    std::fs::create_dir_all(output)
        .map_err(|err| format!("cannot create {}: {err}", output.display()))?;

    let cipher_key = keyring::generate_cipher_key();
    let pair = keyring::generate_signing_keypair().map_err(|err| err.to_string())?;

    let cipher_path = output.join("cipher.key");
    let private_path = output.join("audit_signing.pem");
    let public_path = output.join("audit_signing.pub.pem");

    std::fs::write(&cipher_path, format!("{cipher_key}\n"))
        .map_err(|err| format!("cannot write {}: {err}", cipher_path.display()))?;
    std::fs::write(&private_path, &pair.private_pem)
        .map_err(|err| format!("cannot write {}: {err}", private_path.display()))?;
    std::fs::write(&public_path, &pair.public_pem)
        .map_err(|err| format!("cannot write {}: {err}", public_path.display()))?;

    println!("wrote {}", cipher_path.display());
    println!("wrote {}", private_path.display());
    println!("wrote {}", public_path.display());
    Ok(ExitCode::SUCCESS)
}

fn verify(
    entry: &PathBuf,
    public_key: &PathBuf,
    cipher_key: Option<&str>,
) -> Result<ExitCode, String> {
    let entry_text = std::fs::read_to_string(entry)
        .map_err(|err| format!("cannot read {}: {err}", entry.display()))?;
    let document: Document = serde_json::from_str(&entry_text)
        .map_err(|err| format!("{} is not a JSON document: {err}", entry.display()))?;

    let pem = std::fs::read_to_string(public_key)
        .map_err(|err| format!("cannot read {}: {err}", public_key.display()))?;
    let verifier = AuditVerifier::from_public_key_pem(&pem).map_err(|err| err.to_string())?;

    let material = match cipher_key {
        Some(material) => Some(material.to_string()),
        None => std::env::var(CIPHER_KEY_ENV).ok(),
    };
    let codec = FieldCodec::new(CipherKey::parse(material.as_deref()));

    let outcome = verify_entry(&codec, Some(&verifier), &document);
    println!("{outcome}");
    if outcome.is_valid() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
