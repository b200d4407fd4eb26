//! Figure manifest loading with an owned cache
//!
//! A figure directory holds `manifest.json` plus one JSON document per
//! figure. The loader reads the manifest once and each figure once, and
//! hands out shared `Arc`s. Invalidation is explicit and per-instance.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::errors::{DiffError, DiffResult, SafeLock};
use crate::export::validate_filename;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureEntry {
    pub id: String,
    pub title: String,
    /// Relative to the figure root.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FigureManifest {
    #[serde(default)]
    pub figures: Vec<FigureEntry>,
}

impl FigureManifest {
    pub fn find(&self, id: &str) -> Option<&FigureEntry> {
        self.figures.iter().find(|f| f.id == id)
    }
}

pub struct FigureLoader {
    root: PathBuf,
    manifest: Mutex<Option<Arc<FigureManifest>>>,
    figures: Mutex<HashMap<String, Arc<Value>>>,
}

impl FigureLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest: Mutex::new(None),
            figures: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The figure manifest, read from disk on first use.
    pub fn manifest(&self) -> DiffResult<Arc<FigureManifest>> {
        let mut slot = self.manifest.safe_lock("figure manifest cache")?;
        if let Some(manifest) = slot.as_ref() {
            debug!("figure manifest cache hit");
            return Ok(manifest.clone());
        }

        let path = self.root.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .map_err(|e| DiffError::io(format!("reading {}", path.display()), e))?;
        let manifest: FigureManifest = serde_json::from_str(&content)
            .map_err(|e| DiffError::serialization("parsing figure manifest", e))?;

        let manifest = Arc::new(manifest);
        *slot = Some(manifest.clone());
        Ok(manifest)
    }

    /// One figure document by id.
    pub fn figure(&self, id: &str) -> DiffResult<Arc<Value>> {
        if let Some(hit) = self.figures.safe_lock("figure cache")?.get(id) {
            debug!(figure = id, "figure cache hit");
            return Ok(hit.clone());
        }

        let manifest = self.manifest()?;
        let entry = manifest
            .find(id)
            .ok_or_else(|| DiffError::not_found("figure", id))?;
        let path = self.resolve(&entry.path)?;

        let content = fs::read_to_string(&path)
            .map_err(|e| DiffError::io(format!("reading figure {}", path.display()), e))?;
        let figure: Value = serde_json::from_str(&content)
            .map_err(|e| DiffError::serialization(format!("parsing figure {id}"), e))?;

        let figure = Arc::new(figure);
        self.figures
            .safe_lock("figure cache")?
            .insert(id.to_string(), figure.clone());
        Ok(figure)
    }

    // Each segment must pass the export filename guard, which rules out
    // absolute paths and parent-directory escapes.
    fn resolve(&self, relative: &str) -> DiffResult<PathBuf> {
        let mut path = self.root.clone();
        for segment in relative.split('/') {
            validate_filename(segment)?;
            path.push(segment);
        }
        Ok(path)
    }

    pub fn clear_figure_cache(&self) -> DiffResult<()> {
        self.figures.safe_lock("figure cache")?.clear();
        Ok(())
    }

    /// Drop the cached manifest and every figure loaded through it.
    pub fn invalidate_manifest(&self) -> DiffResult<()> {
        *self.manifest.safe_lock("figure manifest cache")? = None;
        self.clear_figure_cache()
    }

    pub fn cached_figures(&self) -> DiffResult<usize> {
        Ok(self.figures.safe_lock("figure cache")?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn write_json(path: &Path, value: &Value) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, value.to_string()).unwrap();
    }

    #[test]
    fn test_unknown_figure_is_not_found() {
        let dir = tempdir().unwrap();
        write_json(&dir.path().join(MANIFEST_FILE), &json!({"figures": []}));

        let loader = FigureLoader::new(dir.path());
        assert!(matches!(
            loader.figure("missing"),
            Err(DiffError::NotFound { .. })
        ));
    }

    #[test]
    fn test_escaping_paths_are_rejected() {
        let dir = tempdir().unwrap();
        write_json(
            &dir.path().join(MANIFEST_FILE),
            &json!({"figures": [{"id": "evil", "title": "Evil", "path": "../secret.json"}]}),
        );

        let loader = FigureLoader::new(dir.path());
        assert!(matches!(
            loader.figure("evil"),
            Err(DiffError::UnsafeFilename { .. })
        ));
    }

    #[test]
    fn test_missing_manifest_is_io_error() {
        let dir = tempdir().unwrap();
        let loader = FigureLoader::new(dir.path().join("nope"));
        assert!(matches!(loader.manifest(), Err(DiffError::Io { .. })));
    }
}
