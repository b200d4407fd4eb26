//! Batch verifier for signed scenario diff exports
//!
//! Checks every given export (or every `.json` file in a given directory)
//! against one public key and exits non-zero if any fail.

use carbon_diff::keys::verifying_key_from_b64;
use carbon_diff::logging::init_logging;
use carbon_diff::signed_diff::{verify_signed_diff, DiffEnvelope};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "diff_verifier")]
#[command(about = "Verify signed scenario diff exports")]
struct Cli {
    /// Base64 Ed25519 public key
    #[arg(long)]
    public_key: String,

    /// Export files or directories containing them
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn collect(paths: Vec<PathBuf>) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(&path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path);
        }
    }
    Ok(files)
}

fn check(path: &Path, verifying_key: &ed25519_dalek::VerifyingKey) -> anyhow::Result<String> {
    let content = fs::read_to_string(path)?;
    match DiffEnvelope::from_json_str(&content)? {
        DiffEnvelope::Signed(signed) => {
            verify_signed_diff(&signed, verifying_key)?;
            Ok(signed.signer.key_id)
        }
        DiffEnvelope::Unsigned(_) => anyhow::bail!("export is not signed"),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let verifying_key = verifying_key_from_b64(&cli.public_key)?;
    let files = collect(cli.paths)?;

    let mut verified = 0;
    let mut failed = 0;
    for file in &files {
        match check(file, &verifying_key) {
            Ok(key_id) => {
                verified += 1;
                println!("  ok    {} (key_id {key_id})", file.display());
            }
            Err(e) => {
                failed += 1;
                println!("  FAIL  {} - {e}", file.display());
            }
        }
    }

    println!("verified: {verified}, failed: {failed}");
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
