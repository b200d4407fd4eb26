//! Activity catalog lookups
//!
//! The aggregator needs to know, for each activity id, a display label and
//! which category or layer the activity belongs to. [`ActivityCatalog`] is
//! the seam; [`Catalog`] is the file-backed implementation used by the CLI.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::errors::{DiffError, DiffResult};

/// Grouping dimension for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basis {
    #[default]
    Category,
    Layer,
}

impl Basis {
    /// Key used for activities the catalog cannot place.
    pub fn fallback_key(self) -> &'static str {
        match self {
            Basis::Category => "uncategorized",
            Basis::Layer => "unassigned",
        }
    }

    pub fn fallback_group(self) -> Group {
        Group::new(self.fallback_key(), self.fallback_key())
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Basis::Category => f.write_str("category"),
            Basis::Layer => f.write_str("layer"),
        }
    }
}

impl FromStr for Basis {
    type Err = DiffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "category" => Ok(Basis::Category),
            "layer" => Ok(Basis::Layer),
            other => Err(DiffError::validation(
                "basis",
                format!("expected 'category' or 'layer', got '{other}'"),
            )),
        }
    }
}

/// A resolved group: stable key plus display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: String,
    pub label: String,
}

impl Group {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// Lookup of activity metadata needed by the aggregator.
pub trait ActivityCatalog {
    /// Human-readable label for an activity, if known.
    fn activity_label(&self, activity_id: &str) -> Option<&str>;

    /// Group the activity falls into along `basis`, if known.
    fn group(&self, activity_id: &str, basis: Basis) -> Option<Group>;
}

/// One catalog row as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub category_label: Option<String>,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub layer_label: Option<String>,
}

#[derive(Deserialize)]
struct TomlCatalog {
    #[serde(default)]
    activity: Vec<CatalogEntry>,
}

/// In-memory catalog keyed by activity id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    /// Load from a `.json` array of entries or a `.toml` file of
    /// `[[activity]]` tables.
    pub fn from_path<P: AsRef<Path>>(path: P) -> DiffResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| DiffError::io(format!("reading catalog {}", path.display()), e))?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => {
                let parsed: TomlCatalog = toml::from_str(&content)?;
                Ok(Self::new(parsed.activity))
            }
            _ => {
                let entries: Vec<CatalogEntry> = serde_json::from_str(&content)
                    .map_err(|e| DiffError::serialization("parsing catalog", e))?;
                Ok(Self::new(entries))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ActivityCatalog for Catalog {
    fn activity_label(&self, activity_id: &str) -> Option<&str> {
        self.entries.get(activity_id)?.label.as_deref()
    }

    fn group(&self, activity_id: &str, basis: Basis) -> Option<Group> {
        let entry = self.entries.get(activity_id)?;
        let (key, label) = match basis {
            Basis::Category => (entry.category.as_ref()?, entry.category_label.as_ref()),
            Basis::Layer => (entry.layer.as_ref()?, entry.layer_label.as_ref()),
        };
        Some(Group::new(key.clone(), label.unwrap_or(key).clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(id: &str, category: Option<&str>, layer: Option<&str>) -> CatalogEntry {
        CatalogEntry {
            id: id.into(),
            label: Some(format!("{id} label")),
            category: category.map(Into::into),
            category_label: None,
            layer: layer.map(Into::into),
            layer_label: layer.map(|l| format!("Layer {l}")),
        }
    }

    #[test]
    fn test_group_lookup_by_basis() {
        let catalog = Catalog::new([entry("bus", Some("transport"), Some("scope1"))]);

        assert_eq!(
            catalog.group("bus", Basis::Category),
            Some(Group::new("transport", "transport"))
        );
        assert_eq!(
            catalog.group("bus", Basis::Layer),
            Some(Group::new("scope1", "Layer scope1"))
        );
        assert_eq!(catalog.group("ferry", Basis::Category), None);
        assert_eq!(catalog.activity_label("bus"), Some("bus label"));
    }

    #[test]
    fn test_missing_dimension_is_none() {
        let catalog = Catalog::new([entry("heat_pump", Some("home"), None)]);
        assert_eq!(catalog.group("heat_pump", Basis::Layer), None);
    }

    #[test]
    fn test_basis_parsing() {
        assert_eq!("Layer".parse::<Basis>().unwrap(), Basis::Layer);
        assert_eq!("category".parse::<Basis>().unwrap(), Basis::Category);
        assert!("scope".parse::<Basis>().is_err());
        assert_eq!(Basis::Category.fallback_key(), "uncategorized");
        assert_eq!(Basis::Layer.fallback_key(), "unassigned");
    }

    #[test]
    fn test_load_toml_and_json() {
        let dir = tempdir().unwrap();

        let toml_path = dir.path().join("catalog.toml");
        fs::write(
            &toml_path,
            "[[activity]]\nid = \"flight\"\nlabel = \"Flights\"\ncategory = \"travel\"\n",
        )
        .unwrap();
        let from_toml = Catalog::from_path(&toml_path).unwrap();
        assert_eq!(from_toml.len(), 1);
        assert_eq!(from_toml.activity_label("flight"), Some("Flights"));

        let json_path = dir.path().join("catalog.json");
        fs::write(
            &json_path,
            r#"[{"id": "beef", "category": "diet", "category_label": "Diet"}]"#,
        )
        .unwrap();
        let from_json = Catalog::from_path(&json_path).unwrap();
        assert_eq!(
            from_json.group("beef", Basis::Category),
            Some(Group::new("diet", "Diet"))
        );
    }
}
