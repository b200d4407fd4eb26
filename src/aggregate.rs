//! Category and activity delta aggregation
//!
//! Rows from `changed`, `added` and `removed` are bucketed by a catalog
//! lookup. Deltas sum with a missing value counting as zero; base and
//! compare totals only exist for a bucket once some row has supplied one,
//! so "no data" never turns into a verified zero.
//!
//! Output order is a total order (magnitude, then key), which keeps
//! repeated exports of the same diff byte-identical.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::canonicalize::round4;
use crate::catalog::{ActivityCatalog, Basis};
use crate::scenario::{ScenarioActivityChange, ScenarioDiff};

/// Net change for one category (or layer).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryDelta {
    pub key: String,
    pub label: String,
    pub delta: f64,
    pub delta_pct: f64,
    pub total_base: Option<f64>,
    pub total_compare: Option<f64>,
}

/// Net change for one activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityDelta {
    pub activity_id: String,
    pub label: String,
    pub group: String,
    pub delta: f64,
    pub delta_pct: f64,
    pub total_base: Option<f64>,
    pub total_compare: Option<f64>,
}

/// Largest increases and decreases from a delta list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopMovers {
    pub increases: Vec<CategoryDelta>,
    pub decreases: Vec<CategoryDelta>,
}

#[derive(Debug, Default)]
struct Bucket {
    label: String,
    group: String,
    delta: f64,
    base: f64,
    compare: f64,
    has_base: bool,
    has_compare: bool,
}

impl Bucket {
    fn accumulate(&mut self, row: &ScenarioActivityChange) {
        self.delta += row.delta.unwrap_or(0.0);
        if let Some(base) = row.total_base {
            self.base += base;
            self.has_base = true;
        }
        if let Some(compare) = row.total_compare {
            self.compare += compare;
            self.has_compare = true;
        }
    }

    /// Rounded (delta, pct, base, compare).
    fn settle(&self) -> (f64, f64, Option<f64>, Option<f64>) {
        let delta = round4(self.delta);
        let base = round4(self.base);
        let compare = round4(self.compare);
        (
            delta,
            percent_change(delta, base, compare),
            self.has_base.then_some(base),
            self.has_compare.then_some(compare),
        )
    }
}

/// Percentage change as a fraction of the base total.
///
/// Totals are bucket sums, so a bucket that never saw a base total has a
/// base of zero. A base of exactly zero yields `+inf` when the compare
/// total is nonzero and `0` otherwise.
pub fn percent_change(delta: f64, total_base: f64, total_compare: f64) -> f64 {
    if total_base == 0.0 {
        return if total_compare != 0.0 { f64::INFINITY } else { 0.0 };
    }
    delta / total_base
}

fn by_magnitude(a: f64, b: f64) -> Ordering {
    b.abs().total_cmp(&a.abs())
}

/// Net delta per category or layer, largest movers first.
pub fn aggregate_by_category<C: ActivityCatalog + ?Sized>(
    diff: &ScenarioDiff,
    basis: Basis,
    catalog: &C,
) -> Vec<CategoryDelta> {
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();

    for row in diff.rows() {
        let group = catalog
            .group(&row.activity_id, basis)
            .unwrap_or_else(|| basis.fallback_group());
        let bucket = buckets.entry(group.key).or_insert_with(|| Bucket {
            label: group.label,
            ..Bucket::default()
        });
        bucket.accumulate(row);
    }

    let mut out: Vec<CategoryDelta> = buckets
        .into_iter()
        .map(|(key, bucket)| {
            let (delta, delta_pct, total_base, total_compare) = bucket.settle();
            CategoryDelta {
                key,
                label: bucket.label,
                delta,
                delta_pct,
                total_base,
                total_compare,
            }
        })
        .collect();

    out.sort_by(|a, b| by_magnitude(a.delta, b.delta).then_with(|| a.key.cmp(&b.key)));
    out
}

/// Net delta per activity id, largest movers first.
///
/// `basis` selects which catalog group is reported alongside each activity.
pub fn list_activity_deltas<C: ActivityCatalog + ?Sized>(
    diff: &ScenarioDiff,
    catalog: &C,
    basis: Basis,
) -> Vec<ActivityDelta> {
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();

    for row in diff.rows() {
        let bucket = buckets.entry(row.activity_id.clone()).or_insert_with(|| {
            let label = catalog
                .activity_label(&row.activity_id)
                .unwrap_or(&row.activity_id)
                .to_string();
            let group = catalog
                .group(&row.activity_id, basis)
                .map(|g| g.key)
                .unwrap_or_else(|| basis.fallback_key().to_string());
            Bucket {
                label,
                group,
                ..Bucket::default()
            }
        });
        bucket.accumulate(row);
    }

    let mut out: Vec<ActivityDelta> = buckets
        .into_iter()
        .map(|(activity_id, bucket)| {
            let (delta, delta_pct, total_base, total_compare) = bucket.settle();
            ActivityDelta {
                activity_id,
                label: bucket.label,
                group: bucket.group,
                delta,
                delta_pct,
                total_base,
                total_compare,
            }
        })
        .collect();

    out.sort_by(|a, b| {
        by_magnitude(a.delta, b.delta)
            .then_with(|| a.label.cmp(&b.label))
            .then_with(|| a.activity_id.cmp(&b.activity_id))
    });
    out
}

/// Up to `limit` largest increases and decreases. Zero deltas are neither.
pub fn top_movers(deltas: &[CategoryDelta], limit: usize) -> TopMovers {
    let pick = |keep: fn(f64) -> bool| {
        let mut picked: Vec<CategoryDelta> = deltas.iter().filter(|d| keep(d.delta)).cloned().collect();
        picked.sort_by(|a, b| by_magnitude(a.delta, b.delta).then_with(|| a.key.cmp(&b.key)));
        picked.truncate(limit);
        picked
    };

    TopMovers {
        increases: pick(|d| d > 0.0),
        decreases: pick(|d| d < 0.0),
    }
}
