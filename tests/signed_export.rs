//! End-to-end: build, sign, export, read back and verify a scenario diff

use carbon_diff::export::{export_with_fallback, DevFileSink, DownloadSink, ExportOutcome};
use carbon_diff::keys::DiffSigningKey;
use carbon_diff::manifest_hash::Sha256ManifestHasher;
use carbon_diff::{
    build_unsigned_diff, sign_diff, stable_stringify, verify_signed_diff, DiffEnvelope,
    DiffError, ScenarioDiff, ScenarioManifest,
};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn inputs() -> (ScenarioDiff, ScenarioManifest, ScenarioManifest) {
    let diff = ScenarioDiff::from_json_str(
        r#"{
            "changed": [
                {"activity_id": "car_commute", "delta": -812.33333333, "total_base": 2400.1, "total_compare": 1587.76666667},
                {"activity_id": "flights", "delta": 0.1, "total_base": null}
            ],
            "added": [{"activity_id": "heat_pump", "delta": 410.5, "total_compare": 410.5}],
            "removed": [{"activity_id": "gas_boiler", "delta": -1500, "total_base": 1500}]
        }"#,
    )
    .expect("diff parses");

    let base = ScenarioManifest::from_json_str(
        r#"{"sources": ["defra_2024", "ipcc_ar6"], "region": "GB", "household": 2}"#,
    )
    .expect("base manifest parses");
    let compare = ScenarioManifest::from_json_str(
        r#"{"household": 2, "region": "GB", "sources": ["ipcc_ar6", "ember_2025"]}"#,
    )
    .expect("compare manifest parses");

    (diff, base, compare)
}

#[test]
fn signed_export_round_trips_through_disk() {
    let (diff, base, compare) = inputs();
    let created_at = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
    let key = DiffSigningKey::from_seed(&[42u8; 32]);

    let unsigned = build_unsigned_diff(&diff, &base, &compare, &Sha256ManifestHasher, created_at)
        .expect("envelope builds");
    let envelope = DiffEnvelope::from(sign_diff(unsigned, &key, Some("household-app")).unwrap());

    let temp = TempDir::new().unwrap();
    let dev = DevFileSink::new(temp.path().join("exports"));
    let download = DownloadSink::new(temp.path().join("downloads"));
    let data = envelope.to_export_string().unwrap();
    let outcome = export_with_fallback(&envelope.export_filename(), data.as_bytes(), Some(&dev), &download)
        .expect("export succeeds");
    assert!(matches!(outcome, ExportOutcome::Saved(_)));

    let written = fs::read_to_string(outcome.path()).unwrap();
    assert_eq!(written, data);
    assert!(written.ends_with("}\n"));

    let raw: Value = serde_json::from_str(&written).unwrap();
    assert_eq!(raw["spec_version"], "1.0");
    assert_eq!(raw["created_at"], "2026-10-18T08:00:00.000Z");
    assert_eq!(raw["signer"]["algo"], "ed25519");
    assert_eq!(raw["signer"]["key_id"], "household-app");
    assert_eq!(
        raw["sources_union"],
        serde_json::json!(["defra_2024", "ember_2025", "ipcc_ar6"])
    );
    assert_eq!(raw["scenario_diff"]["changed"][0]["delta"], serde_json::json!(-812.3333));

    match DiffEnvelope::from_json_str(&written).unwrap() {
        DiffEnvelope::Signed(signed) => {
            verify_signed_diff(&signed, key.verifying_key()).expect("signature verifies");

            // Manual check: the signature covers the payload without signer fields.
            let mut stripped = raw.clone();
            let map = stripped.as_object_mut().unwrap();
            map.remove("signer");
            map.remove("signature");
            let canonical = stable_stringify(&stripped).unwrap();
            key.verify_signature(canonical.as_bytes(), &signed.signature)
                .expect("detached signature over stripped payload");
        }
        DiffEnvelope::Unsigned(_) => panic!("expected a signed envelope"),
    }
}

#[test]
fn editing_the_exported_file_breaks_the_signature() {
    let (diff, base, compare) = inputs();
    let key = DiffSigningKey::from_seed(&[1u8; 32]);
    let unsigned =
        build_unsigned_diff(&diff, &base, &compare, &Sha256ManifestHasher, Utc::now()).unwrap();
    let text = DiffEnvelope::from(sign_diff(unsigned, &key, None).unwrap())
        .to_export_string()
        .unwrap();

    let tampered = text.replace("\"delta\": 410.5", "\"delta\": 41.05");
    assert_ne!(tampered, text);

    match DiffEnvelope::from_json_str(&tampered).unwrap() {
        DiffEnvelope::Signed(signed) => assert!(matches!(
            verify_signed_diff(&signed, key.verifying_key()),
            Err(DiffError::Signature { .. })
        )),
        DiffEnvelope::Unsigned(_) => panic!("expected a signed envelope"),
    }
}

#[test]
fn manifest_hashes_ignore_key_order() {
    let (diff, base, compare) = inputs();
    let reordered = ScenarioManifest::from_json_str(
        r#"{"region": "GB", "household": 2, "sources": ["defra_2024", "ipcc_ar6"]}"#,
    )
    .unwrap();

    let a = build_unsigned_diff(&diff, &base, &compare, &Sha256ManifestHasher, Utc::now()).unwrap();
    let b = build_unsigned_diff(&diff, &reordered, &compare, &Sha256ManifestHasher, Utc::now()).unwrap();
    assert_eq!(a.base_hash, b.base_hash);
    assert_ne!(a.base_hash, a.compare_hash);
}

#[test]
fn repeated_exports_are_byte_identical() {
    let (diff, base, compare) = inputs();
    let created_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let key = DiffSigningKey::from_seed(&[3u8; 32]);

    let render = || {
        let unsigned =
            build_unsigned_diff(&diff, &base, &compare, &Sha256ManifestHasher, created_at).unwrap();
        DiffEnvelope::from(sign_diff(unsigned, &key, None).unwrap())
            .to_export_string()
            .unwrap()
    };

    assert_eq!(render(), render());
}

#[test]
fn path_injection_is_refused_before_writing() {
    let temp = TempDir::new().unwrap();
    let download = DownloadSink::new(temp.path().join("downloads"));

    let result = export_with_fallback("../etc/passwd", b"{}\n", None, &download);
    assert!(matches!(result, Err(DiffError::UnsafeFilename { .. })));
    assert!(!temp.path().join("downloads").exists());
}
