//! Content hashing for scenario manifests

use sha2::{Digest, Sha256};

use crate::canonicalize::stable_stringify;
use crate::errors::DiffResult;
use crate::scenario::ScenarioManifest;

/// Produces an identity hash for a scenario manifest.
pub trait ManifestHasher {
    fn hash_manifest(&self, manifest: &ScenarioManifest) -> DiffResult<String>;
}

/// Lowercase hex SHA-256 over the canonical serialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256ManifestHasher;

impl ManifestHasher for Sha256ManifestHasher {
    fn hash_manifest(&self, manifest: &ScenarioManifest) -> DiffResult<String> {
        let canonical = stable_stringify(manifest)?;
        Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
    }
}
