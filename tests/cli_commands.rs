//! Integration tests for the carbon_diff and diff_verifier binaries

use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run(bin: &str, dir: &Path, args: &[&str]) -> Output {
    Command::new(bin)
        .current_dir(dir)
        .env("CARBON_DIFF_CONFIG", dir.join("absent.toml"))
        .env("CARBON_DIFF_LOG__LEVEL", "warn")
        .args(args)
        .output()
        .expect("failed to spawn binary")
}

fn carbon_diff(dir: &Path, args: &[&str]) -> Output {
    run(env!("CARGO_BIN_EXE_carbon_diff"), dir, args)
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn seed(dir: &Path) {
    fs::write(
        dir.join("diff.json"),
        r#"{
            "changed": [{"activity_id": "car", "delta": -50, "total_base": 200, "total_compare": 150}],
            "added": [{"activity_id": "beef", "delta": 30, "total_base": 0, "total_compare": 30}],
            "removed": [{"activity_id": "train", "delta": -5}]
        }"#,
    )
    .unwrap();
    fs::write(
        dir.join("catalog.toml"),
        r#"
[[activity]]
id = "car"
label = "Car"
category = "transport"

[[activity]]
id = "train"
label = "Train"
category = "transport"

[[activity]]
id = "beef"
label = "Beef"
category = "diet"
"#,
    )
    .unwrap();
    fs::write(dir.join("base.json"), r#"{"sources": ["a", "b"]}"#).unwrap();
    fs::write(dir.join("compare.json"), r#"{"sources": ["c", "a"]}"#).unwrap();
}

#[test]
fn test_aggregate_prints_canonical_deltas() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());

    let out = stdout(&carbon_diff(
        temp.path(),
        &["aggregate", "--diff", "diff.json", "--catalog", "catalog.toml", "--top", "1"],
    ));
    assert!(out.ends_with("}\n"));

    let value: Value = serde_json::from_str(&out).unwrap();
    let categories = value["categories"].as_array().unwrap();
    assert_eq!(categories[0]["key"], "transport");
    assert_eq!(categories[0]["delta"], -55);
    assert_eq!(categories[1]["key"], "diet");
    // Infinite percentages have no JSON form and come out as null.
    assert!(categories[1]["delta_pct"].is_null());
    assert_eq!(value["top_movers"]["increases"][0]["key"], "diet");
    assert_eq!(value["top_movers"]["decreases"][0]["key"], "transport");
}

#[test]
fn test_activities_listing() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());

    let out = stdout(&carbon_diff(
        temp.path(),
        &["activities", "--diff", "diff.json", "--catalog", "catalog.toml"],
    ));
    let value: Value = serde_json::from_str(&out).unwrap();
    let labels: Vec<&str> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["Car", "Beef", "Train"]);
}

#[test]
fn test_generate_export_and_verify() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());

    let keygen = stdout(&carbon_diff(temp.path(), &["generate-key", "--output", "keys/k.json"]));
    let public_key = keygen
        .lines()
        .find_map(|l| l.strip_prefix("public_key: "))
        .expect("public key printed")
        .to_string();
    assert!(temp.path().join("keys/k.json").exists());

    let export = stdout(&carbon_diff(
        temp.path(),
        &[
            "export",
            "--diff",
            "diff.json",
            "--base-manifest",
            "base.json",
            "--compare-manifest",
            "compare.json",
            "--key",
            "keys/k.json",
            "--key-id",
            "cli-test",
            "--out-dir",
            "downloads",
        ],
    ));
    assert!(export.starts_with("Downloaded: "));

    let exported: Vec<_> = fs::read_dir(temp.path().join("downloads"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(exported.len(), 1);
    let file = &exported[0];
    let name = file.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("scenario_diff_") && name.ends_with(".json"));

    let verified = stdout(&carbon_diff(
        temp.path(),
        &["verify", "--file", file.to_str().unwrap(), "--public-key", &public_key],
    ));
    assert!(verified.contains("signature valid (key_id cli-test)"));

    let batch = run(
        env!("CARGO_BIN_EXE_diff_verifier"),
        temp.path(),
        &["--public-key", &public_key, "downloads"],
    );
    assert!(stdout(&batch).contains("verified: 1, failed: 0"));
}

#[test]
fn test_dev_mode_writes_to_export_dir() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());

    let out = stdout(&carbon_diff(
        temp.path(),
        &[
            "export",
            "--diff",
            "diff.json",
            "--base-manifest",
            "base.json",
            "--compare-manifest",
            "compare.json",
            "--out-dir",
            "downloads",
            "--dev",
        ],
    ));
    assert!(out.starts_with("Saved: "));
    assert_eq!(fs::read_dir(temp.path().join("exports")).unwrap().count(), 1);
    assert!(!temp.path().join("downloads").exists());
}

#[test]
fn test_verify_rejects_wrong_key() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());

    stdout(&carbon_diff(temp.path(), &["generate-key", "--output", "signer.json"]));
    let other = stdout(&carbon_diff(temp.path(), &["generate-key", "--output", "other.json"]));
    let other_key = other
        .lines()
        .find_map(|l| l.strip_prefix("public_key: "))
        .unwrap()
        .to_string();

    stdout(&carbon_diff(
        temp.path(),
        &[
            "export",
            "--diff",
            "diff.json",
            "--base-manifest",
            "base.json",
            "--compare-manifest",
            "compare.json",
            "--key",
            "signer.json",
            "--out-dir",
            "out",
        ],
    ));
    let file = fs::read_dir(temp.path().join("out"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();

    let result = carbon_diff(
        temp.path(),
        &["verify", "--file", file.to_str().unwrap(), "--public-key", &other_key],
    );
    assert!(!result.status.success());
}

#[test]
fn test_invalid_basis_is_rejected() {
    let temp = TempDir::new().unwrap();
    seed(temp.path());

    let result = carbon_diff(
        temp.path(),
        &["aggregate", "--diff", "diff.json", "--catalog", "catalog.toml", "--basis", "scope"],
    );
    assert!(!result.status.success());
}
