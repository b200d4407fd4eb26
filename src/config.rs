//! Runtime configuration for export, signing, figures and logging
//!
//! Layers, lowest to highest precedence: built-in defaults, a TOML file
//! (`carbon_diff.toml`, or the path in `CARBON_DIFF_CONFIG`), then
//! `CARBON_DIFF_*` environment variables with `__` separating sections,
//! e.g. `CARBON_DIFF_EXPORT__DEV_MODE=true`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{DiffError, DiffResult};
use crate::export::DownloadSink;

pub const CONFIG_PATH_ENV: &str = "CARBON_DIFF_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "carbon_diff.toml";
pub const ENV_PREFIX: &str = "CARBON_DIFF_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffConfig {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub figures: FiguresConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Target of development-mode writes.
    #[serde(default = "default_export_dir")]
    pub dir: String,
    #[serde(default)]
    pub dev_mode: bool,
    /// Overrides the platform download directory.
    #[serde(default)]
    pub download_dir: Option<String>,
    #[serde(default = "default_status_reset_ms")]
    pub status_reset_ms: u64,
}

fn default_export_dir() -> String {
    "exports".to_string()
}

fn default_status_reset_ms() -> u64 {
    2500
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
            dev_mode: false,
            download_dir: None,
            status_reset_ms: default_status_reset_ms(),
        }
    }
}

impl ExportConfig {
    pub fn status_reset(&self) -> Duration {
        Duration::from_millis(self.status_reset_ms)
    }

    pub fn download_sink(&self) -> DownloadSink {
        match &self.download_dir {
            Some(dir) => DownloadSink::new(dir),
            None => DownloadSink::user_downloads(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub key_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiguresConfig {
    #[serde(default = "default_figures_root")]
    pub root: String,
}

fn default_figures_root() -> String {
    "data/figures".to_string()
}

impl Default for FiguresConfig {
    fn default() -> Self {
        Self {
            root: default_figures_root(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DiffConfig {
    pub fn validate(&self) -> DiffResult<()> {
        if self.export.dir.trim().is_empty() {
            return Err(DiffError::config("export.dir cannot be empty"));
        }
        if self.export.status_reset_ms == 0 {
            return Err(DiffError::config("export.status_reset_ms must be greater than zero"));
        }
        if self.figures.root.trim().is_empty() {
            return Err(DiffError::config("figures.root cannot be empty"));
        }
        Ok(())
    }

    pub fn export_dir(&self) -> PathBuf {
        PathBuf::from(&self.export.dir)
    }
}

/// Load configuration from the default file location.
pub fn load_config() -> DiffResult<DiffConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    load_config_from(path)
}

/// Load configuration using `path` as the TOML layer. A missing file is
/// not an error.
pub fn load_config_from<P: AsRef<Path>>(path: P) -> DiffResult<DiffConfig> {
    let figment = Figment::from(Serialized::defaults(DiffConfig::default()))
        .merge(Toml::file(path.as_ref()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: DiffConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}
