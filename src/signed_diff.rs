//! Scenario diff envelopes and their detached Ed25519 signatures
//!
//! Building and signing are separate steps: [`build_unsigned_diff`] always
//! produces an [`UnsignedDiff`], and [`sign_diff`] turns one into a
//! [`SignedDiff`]. The signature covers exactly the canonical serialization
//! of the unsigned envelope, so a verifier strips `signer` and `signature`
//! and re-canonicalizes before checking.

use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::canonicalize::{stable_stringify, to_canonical_value, Canonicalize};
use crate::errors::{DiffError, DiffResult};
use crate::export::diff_filename;
use crate::keys::{verify_detached, DiffSigningKey};
use crate::manifest_hash::ManifestHasher;
use crate::scenario::{ScenarioActivityChange, ScenarioDiff, ScenarioManifest};

/// Envelope format version written to every export.
pub const SPEC_VERSION: &str = "1.0";

/// The only signature algorithm this crate produces or accepts.
pub const SIGNATURE_ALGO: &str = "ed25519";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestHashes {
    pub base: String,
    pub compare: String,
}

/// Diff envelope before signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedDiff {
    pub spec_version: String,
    pub created_at: String,
    pub base_hash: String,
    pub compare_hash: String,
    pub scenario_diff: ScenarioDiff,
    pub sources_union: Vec<String>,
    pub manifest_hashes: ManifestHashes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignerInfo {
    pub algo: String,
    pub key_id: String,
}

/// Diff envelope with a detached signature over its unsigned form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedDiff {
    #[serde(flatten)]
    pub payload: UnsignedDiff,
    pub signer: SignerInfo,
    pub signature: String,
}

/// Either envelope, serialized without a tag so the wire format is the
/// same flat object in both cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiffEnvelope {
    Signed(SignedDiff),
    Unsigned(UnsignedDiff),
}

impl Canonicalize for UnsignedDiff {
    fn canonical_value(&self) -> DiffResult<Value> {
        to_canonical_value(self, "unsigned diff")
    }
}

impl Canonicalize for SignedDiff {
    fn canonical_value(&self) -> DiffResult<Value> {
        to_canonical_value(self, "signed diff")
    }
}

impl Canonicalize for DiffEnvelope {
    fn canonical_value(&self) -> DiffResult<Value> {
        match self {
            DiffEnvelope::Signed(signed) => signed.canonical_value(),
            DiffEnvelope::Unsigned(unsigned) => unsigned.canonical_value(),
        }
    }
}

impl From<UnsignedDiff> for DiffEnvelope {
    fn from(diff: UnsignedDiff) -> Self {
        DiffEnvelope::Unsigned(diff)
    }
}

impl From<SignedDiff> for DiffEnvelope {
    fn from(diff: SignedDiff) -> Self {
        DiffEnvelope::Signed(diff)
    }
}

impl DiffEnvelope {
    pub fn payload(&self) -> &UnsignedDiff {
        match self {
            DiffEnvelope::Signed(signed) => &signed.payload,
            DiffEnvelope::Unsigned(unsigned) => unsigned,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, DiffEnvelope::Signed(_))
    }

    /// Canonical file contents, trailing newline included.
    pub fn to_export_string(&self) -> DiffResult<String> {
        stable_stringify(self)
    }

    /// `scenario_diff_<base>_vs_<compare>.json`
    pub fn export_filename(&self) -> String {
        let payload = self.payload();
        diff_filename(&payload.base_hash, &payload.compare_hash)
    }

    pub fn from_json_str(json: &str) -> DiffResult<Self> {
        serde_json::from_str(json).map_err(|e| DiffError::serialization("parsing diff envelope", e))
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

// Non-finite numbers would serialize as null and then read back as absent,
// which changes the canonical bytes after a round trip.
fn sanitize(diff: &ScenarioDiff) -> ScenarioDiff {
    let clean = |rows: &Option<Vec<ScenarioActivityChange>>| {
        rows.as_ref().map(|rows| {
            rows.iter()
                .map(|row| ScenarioActivityChange {
                    activity_id: row.activity_id.clone(),
                    delta: finite(row.delta),
                    total_base: finite(row.total_base),
                    total_compare: finite(row.total_compare),
                })
                .collect()
        })
    };

    ScenarioDiff {
        changed: clean(&diff.changed),
        added: clean(&diff.added),
        removed: clean(&diff.removed),
    }
}

/// Assemble the unsigned envelope for a diff between two manifests.
pub fn build_unsigned_diff<H: ManifestHasher + ?Sized>(
    diff: &ScenarioDiff,
    base_manifest: &ScenarioManifest,
    compare_manifest: &ScenarioManifest,
    hasher: &H,
    created_at: DateTime<Utc>,
) -> DiffResult<UnsignedDiff> {
    let base_hash = hasher.hash_manifest(base_manifest)?;
    let compare_hash = hasher.hash_manifest(compare_manifest)?;

    let sources_union: Vec<String> = base_manifest
        .sources
        .iter()
        .chain(compare_manifest.sources.iter())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    debug!(
        base = %base_hash,
        compare = %compare_hash,
        sources = sources_union.len(),
        "built unsigned scenario diff"
    );

    Ok(UnsignedDiff {
        spec_version: SPEC_VERSION.to_string(),
        created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        manifest_hashes: ManifestHashes {
            base: base_hash.clone(),
            compare: compare_hash.clone(),
        },
        base_hash,
        compare_hash,
        scenario_diff: sanitize(diff),
        sources_union,
    })
}

/// Sign an envelope. `key_id` defaults to the key's own derived id.
pub fn sign_diff(
    unsigned: UnsignedDiff,
    key: &DiffSigningKey,
    key_id: Option<&str>,
) -> DiffResult<SignedDiff> {
    let canonical = stable_stringify(&unsigned)?;
    let signature = key.sign_canonical_bytes(canonical.as_bytes());
    let key_id = key_id.map(str::to_string).unwrap_or_else(|| key.key_id());

    info!(key_id = %key_id, bytes = canonical.len(), "signed scenario diff");

    Ok(SignedDiff {
        payload: unsigned,
        signer: SignerInfo {
            algo: SIGNATURE_ALGO.to_string(),
            key_id,
        },
        signature,
    })
}

/// Check a signed envelope against a public key.
pub fn verify_signed_diff(signed: &SignedDiff, verifying_key: &VerifyingKey) -> DiffResult<()> {
    if signed.signer.algo != SIGNATURE_ALGO {
        return Err(DiffError::signature(format!(
            "unsupported algorithm '{}'",
            signed.signer.algo
        )));
    }

    let canonical = stable_stringify(&signed.payload)?;
    verify_detached(verifying_key, canonical.as_bytes(), &signed.signature)?;
    Ok(())
}
