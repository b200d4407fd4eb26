//! Scenario diff and manifest types
//!
//! These are produced upstream by the scenario engine and consumed here
//! read-only. Numeric fields on a change row are lenient: anything that is
//! not a finite JSON number is read as absent rather than rejected, so a
//! single malformed row cannot poison a whole export.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::canonicalize::{to_canonical_value, Canonicalize};
use crate::errors::{DiffError, DiffResult};

/// One activity's emissions change between the base and compare scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioActivityChange {
    pub activity_id: String,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub delta: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_base: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_compare: Option<f64>,
}

impl ScenarioActivityChange {
    pub fn new(activity_id: impl Into<String>) -> Self {
        Self {
            activity_id: activity_id.into(),
            delta: None,
            total_base: None,
            total_compare: None,
        }
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_totals(mut self, base: Option<f64>, compare: Option<f64>) -> Self {
        self.total_base = base;
        self.total_compare = compare;
        self
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| v.as_f64()).filter(|n| n.is_finite()))
}

/// All activity-level changes between two scenarios.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<Vec<ScenarioActivityChange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added: Option<Vec<ScenarioActivityChange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<ScenarioActivityChange>>,
}

impl ScenarioDiff {
    /// Rows from `changed`, `added` and `removed`, in that order.
    pub fn rows(&self) -> impl Iterator<Item = &ScenarioActivityChange> {
        [&self.changed, &self.added, &self.removed]
            .into_iter()
            .flat_map(|list| list.iter().flatten())
    }

    pub fn is_empty(&self) -> bool {
        self.rows().next().is_none()
    }

    pub fn from_json_str(json: &str) -> DiffResult<Self> {
        serde_json::from_str(json).map_err(|e| DiffError::serialization("parsing scenario diff", e))
    }
}

impl Canonicalize for ScenarioDiff {
    fn canonical_value(&self) -> DiffResult<Value> {
        to_canonical_value(self, "scenario diff")
    }
}

/// Metadata describing a scenario's inputs.
///
/// Only `sources` is interpreted; every other field is carried through
/// untouched so it still contributes to the manifest hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioManifest {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScenarioManifest {
    pub fn with_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            extra: Map::new(),
        }
    }

    pub fn from_json_str(json: &str) -> DiffResult<Self> {
        serde_json::from_str(json).map_err(|e| DiffError::serialization("parsing scenario manifest", e))
    }
}

impl Canonicalize for ScenarioManifest {
    fn canonical_value(&self) -> DiffResult<Value> {
        to_canonical_value(self, "scenario manifest")
    }
}
