//! Library root for the `carbon_diff` crate
//!
//! Compares two carbon footprint scenarios, aggregates the change by
//! category, layer or activity, and exports the diff as canonical JSON
//! with an optional detached Ed25519 signature.

// Core error handling
pub mod errors;

// Canonical serialization
pub mod canonicalize;

// Scenario inputs and hashing
pub mod manifest_hash;
pub mod scenario;

// Aggregation
pub mod aggregate;
pub mod catalog;

// Signing & export
pub mod export;
pub mod keys;
pub mod signed_diff;

// Figure data
pub mod figures;

// Configuration, logging & CLI
pub mod cli;
pub mod config;
pub mod logging;


pub use aggregate::{aggregate_by_category, list_activity_deltas, top_movers, ActivityDelta, CategoryDelta};
pub use canonicalize::{stable_stringify, stable_stringify_value, Canonicalize};
pub use errors::{DiffError, DiffResult};
pub use scenario::{ScenarioActivityChange, ScenarioDiff, ScenarioManifest};
pub use signed_diff::{build_unsigned_diff, sign_diff, verify_signed_diff, DiffEnvelope, SignedDiff, UnsignedDiff};
