use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

use crate::aggregate::{aggregate_by_category, list_activity_deltas, top_movers};
use crate::canonicalize::{stable_stringify_value, to_canonical_value};
use crate::catalog::{Basis, Catalog};
use crate::config::DiffConfig;
use crate::export::{export_with_fallback, DevFileSink, DownloadSink, ExportSink, ExportStatus};
use crate::figures::FigureLoader;
use crate::keys::{verifying_key_from_b64, DiffSigningKey};
use crate::manifest_hash::Sha256ManifestHasher;
use crate::scenario::{ScenarioDiff, ScenarioManifest};
use crate::signed_diff::{build_unsigned_diff, sign_diff, verify_signed_diff, DiffEnvelope};

/// Top-level CLI interface
#[derive(Parser)]
#[command(
    name = "carbon_diff",
    version,
    about = "Compare carbon footprint scenarios and export signed diffs"
)]
pub struct Cli {
    /// Path to a TOML config file (overrides CARBON_DIFF_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a new Ed25519 signing key file
    GenerateKey {
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Net emission change per category or layer
    Aggregate {
        #[arg(short, long)]
        diff: PathBuf,
        #[arg(short, long)]
        catalog: PathBuf,
        #[arg(long, default_value_t = Basis::Category)]
        basis: Basis,
        /// Also report the N largest increases and decreases
        #[arg(long)]
        top: Option<usize>,
    },

    /// Net emission change per activity
    Activities {
        #[arg(short, long)]
        diff: PathBuf,
        #[arg(short, long)]
        catalog: PathBuf,
        #[arg(long, default_value_t = Basis::Category)]
        basis: Basis,
    },

    /// Build a diff envelope, sign it when a key is available, and export it
    Export {
        #[arg(short, long)]
        diff: PathBuf,
        #[arg(long)]
        base_manifest: PathBuf,
        #[arg(long)]
        compare_manifest: PathBuf,
        /// Signing key file (falls back to signing.key_path)
        #[arg(short, long)]
        key: Option<PathBuf>,
        #[arg(long)]
        key_id: Option<String>,
        /// Download directory override
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Try the development export directory first
        #[arg(long)]
        dev: bool,
    },

    /// Verify a signed diff export
    Verify {
        #[arg(short, long)]
        file: PathBuf,
        /// Base64 Ed25519 public key
        #[arg(long)]
        public_key: String,
    },

    /// List figures or print one
    Figures {
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long)]
        id: Option<String>,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading {what} from {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {what} in {}", path.display()))
}

pub fn dispatch(cli: Cli, config: &DiffConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::GenerateKey { output } => {
            let key = DiffSigningKey::generate()?;
            key.save_to_file(&output, "Scenario diff signing")?;
            info!(path = %output.display(), "generated signing key");
            println!("public_key: {}", key.public_key_b64());
            println!("key_id: {}", key.key_id());
        }
        Commands::Aggregate {
            diff,
            catalog,
            basis,
            top,
        } => {
            let diff: ScenarioDiff = read_json(&diff, "scenario diff")?;
            let catalog = Catalog::from_path(&catalog)?;
            let deltas = aggregate_by_category(&diff, basis, &catalog);

            let value = match top {
                Some(limit) => json!({
                    "categories": to_canonical_value(&deltas, "category deltas")?,
                    "top_movers": to_canonical_value(&top_movers(&deltas, limit), "top movers")?,
                }),
                None => to_canonical_value(&deltas, "category deltas")?,
            };
            print!("{}", stable_stringify_value(&value));
        }
        Commands::Activities {
            diff,
            catalog,
            basis,
        } => {
            let diff: ScenarioDiff = read_json(&diff, "scenario diff")?;
            let catalog = Catalog::from_path(&catalog)?;
            let deltas = list_activity_deltas(&diff, &catalog, basis);
            print!(
                "{}",
                stable_stringify_value(&to_canonical_value(&deltas, "activity deltas")?)
            );
        }
        Commands::Export {
            diff,
            base_manifest,
            compare_manifest,
            key,
            key_id,
            out_dir,
            dev,
        } => {
            let diff: ScenarioDiff = read_json(&diff, "scenario diff")?;
            let base: ScenarioManifest = read_json(&base_manifest, "base manifest")?;
            let compare: ScenarioManifest = read_json(&compare_manifest, "compare manifest")?;

            let unsigned =
                build_unsigned_diff(&diff, &base, &compare, &Sha256ManifestHasher, Utc::now())?;

            let key_path = key.or_else(|| config.signing.key_path.as_ref().map(PathBuf::from));
            let envelope: DiffEnvelope = match key_path {
                Some(path) => {
                    let signing_key = DiffSigningKey::load_from_file(&path)
                        .with_context(|| format!("loading signing key {}", path.display()))?;
                    let key_id = key_id.or_else(|| config.signing.key_id.clone());
                    sign_diff(unsigned, &signing_key, key_id.as_deref())?.into()
                }
                None => unsigned.into(),
            };

            let data = envelope.to_export_string()?;
            let filename = envelope.export_filename();

            let dev_sink = DevFileSink::new(config.export_dir());
            let download = match out_dir {
                Some(dir) => DownloadSink::new(dir),
                None => config.export.download_sink(),
            };
            let primary: Option<&dyn ExportSink> = if dev || config.export.dev_mode {
                Some(&dev_sink)
            } else {
                None
            };

            let mut status = ExportStatus::new(config.export.status_reset());
            let result = export_with_fallback(&filename, data.as_bytes(), primary, &download);
            let state = status.record(&result, Instant::now());

            match result {
                Ok(outcome) => {
                    println!("{state:?}: {}", outcome.path().display());
                }
                Err(e) => {
                    error!(error = %e, state = ?state, "export failed");
                    return Err(e.into());
                }
            }
        }
        Commands::Verify { file, public_key } => {
            let content = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let verifying_key = verifying_key_from_b64(&public_key)?;

            match DiffEnvelope::from_json_str(&content)? {
                DiffEnvelope::Signed(signed) => {
                    verify_signed_diff(&signed, &verifying_key)?;
                    println!("signature valid (key_id {})", signed.signer.key_id);
                }
                DiffEnvelope::Unsigned(_) => bail!("{} is not signed", file.display()),
            }
        }
        Commands::Figures { root, id } => {
            let root = root.unwrap_or_else(|| PathBuf::from(&config.figures.root));
            let loader = FigureLoader::new(root);
            match id {
                Some(id) => {
                    let figure = loader.figure(&id)?;
                    print!("{}", stable_stringify_value(&figure));
                }
                None => {
                    for entry in &loader.manifest()?.figures {
                        println!("{}\t{}", entry.id, entry.title);
                    }
                }
            }
        }
    }

    Ok(())
}
