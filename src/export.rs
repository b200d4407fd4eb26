//! Export of diff envelopes to disk
//!
//! Filenames are checked against a strict allow-list before any I/O
//! happens, since they are usually built from manifest hashes that came
//! from outside. In development mode the envelope is written straight into
//! the project's export directory; if that fails, or outside development
//! mode, it goes to the user's download directory instead.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::errors::{DiffError, DiffResult};

/// Reject anything but `[A-Za-z0-9._-]+`, plus the `.` and `..` entries.
pub fn validate_filename(filename: &str) -> DiffResult<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
    if filename.is_empty() || filename == "." || filename == ".." || !filename.chars().all(allowed) {
        return Err(DiffError::unsafe_filename(filename));
    }
    Ok(())
}

fn slug(hash: &str, fallback: &str) -> String {
    let cleaned: String = hash
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        .collect();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// `scenario_diff_<base>_vs_<compare>.json`
pub fn diff_filename(base_hash: &str, compare_hash: &str) -> String {
    format!(
        "scenario_diff_{}_vs_{}.json",
        slug(base_hash, "base"),
        slug(compare_hash, "compare")
    )
}

/// A destination an export can be written to.
pub trait ExportSink {
    fn name(&self) -> &str;

    /// Write `data` under `filename`, returning where it landed.
    fn write(&self, filename: &str, data: &[u8]) -> DiffResult<PathBuf>;
}

fn ensure_dir(dir: &Path) -> DiffResult<()> {
    fs::create_dir_all(dir)
        .map_err(|e| DiffError::io(format!("creating export directory {}", dir.display()), e))
}

/// Development-mode sink: writes into a fixed directory, replacing any
/// previous export of the same name.
#[derive(Debug, Clone)]
pub struct DevFileSink {
    dir: PathBuf,
}

impl DevFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ExportSink for DevFileSink {
    fn name(&self) -> &str {
        "dev-file"
    }

    fn write(&self, filename: &str, data: &[u8]) -> DiffResult<PathBuf> {
        validate_filename(filename)?;
        ensure_dir(&self.dir)?;
        let path = self.dir.join(filename);
        fs::write(&path, data)
            .map_err(|e| DiffError::io(format!("writing {}", path.display()), e))?;
        Ok(path)
    }
}

/// Download-style sink: never overwrites, picking `name (n).ext` when the
/// target already exists.
#[derive(Debug, Clone)]
pub struct DownloadSink {
    dir: PathBuf,
}

impl DownloadSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The platform download directory, or the working directory when
    /// there is none.
    pub fn user_downloads() -> Self {
        Self::new(dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// `filename`, then `stem (1).ext`, `stem (2).ext` and so on.
    fn candidate(&self, filename: &str, n: u32) -> PathBuf {
        if n == 0 {
            return self.dir.join(filename);
        }
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self.dir.join(format!("{stem} ({n}).{ext}")),
            _ => self.dir.join(format!("{filename} ({n})")),
        }
    }
}

impl ExportSink for DownloadSink {
    fn name(&self) -> &str {
        "download"
    }

    fn write(&self, filename: &str, data: &[u8]) -> DiffResult<PathBuf> {
        validate_filename(filename)?;
        ensure_dir(&self.dir)?;

        // create_new: a name that is already taken is skipped, never truncated.
        for n in 0..=u32::MAX {
            let path = self.candidate(filename, n);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(DiffError::io(format!("creating {}", path.display()), e)),
            };
            file.write_all(data)
                .map_err(|e| DiffError::io(format!("writing {}", path.display()), e))?;
            return Ok(path);
        }
        Err(DiffError::export_failed(filename, "no free name left in the download directory"))
    }
}

/// Where an export ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Saved(PathBuf),
    Downloaded(PathBuf),
}

impl ExportOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ExportOutcome::Saved(p) | ExportOutcome::Downloaded(p) => p,
        }
    }
}

/// Validate, try `primary` once if present, then fall back once.
pub fn export_with_fallback(
    filename: &str,
    data: &[u8],
    primary: Option<&dyn ExportSink>,
    fallback: &dyn ExportSink,
) -> DiffResult<ExportOutcome> {
    validate_filename(filename)?;

    if let Some(primary) = primary {
        match primary.write(filename, data) {
            Ok(path) => {
                info!(sink = primary.name(), path = %path.display(), "export saved");
                return Ok(ExportOutcome::Saved(path));
            }
            Err(e) => {
                warn!(sink = primary.name(), error = %e, "export write failed, falling back");
            }
        }
    }

    let path = fallback
        .write(filename, data)
        .map_err(|e| DiffError::export_failed(filename, e.to_string()))?;
    info!(sink = fallback.name(), path = %path.display(), "export downloaded");
    Ok(ExportOutcome::Downloaded(path))
}

/// Feedback state shown after an export attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Saved,
    Downloaded,
    Error,
}

/// Short-lived export feedback that drops back to `Idle` after a fixed
/// display time.
#[derive(Debug, Clone)]
pub struct ExportStatus {
    state: ExportState,
    since: Option<Instant>,
    reset_after: Duration,
}

impl ExportStatus {
    pub fn new(reset_after: Duration) -> Self {
        Self {
            state: ExportState::Idle,
            since: None,
            reset_after,
        }
    }

    pub fn record(&mut self, result: &DiffResult<ExportOutcome>, now: Instant) -> ExportState {
        self.state = match result {
            Ok(ExportOutcome::Saved(_)) => ExportState::Saved,
            Ok(ExportOutcome::Downloaded(_)) => ExportState::Downloaded,
            Err(_) => ExportState::Error,
        };
        self.since = Some(now);
        self.state
    }

    /// Current state, resetting to `Idle` once the display time has passed.
    pub fn poll(&mut self, now: Instant) -> ExportState {
        if let Some(since) = self.since {
            if now.saturating_duration_since(since) >= self.reset_after {
                self.state = ExportState::Idle;
                self.since = None;
            }
        }
        self.state
    }
}
