//! Read-side queries over the persisted store

use lcr_core::DateKey;
use lcr_engine::{EngineError, ProcessingMode, Upload};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::*;

fn key(s: &str) -> DateKey {
    DateKey::parse(s).unwrap()
}

#[test]
fn test_latest_and_dates() {
    let h = Harness::new().with_template();
    let engine = h.engine();
    for name in ["a_2026-02-03.xlsx", "b_2026-02-05.xlsx", "c_2026-02-04.xlsx"] {
        engine.try_ingest(Upload::new(extract(), name)).unwrap();
    }

    let dates = engine.dates();
    assert_eq!(dates.dates, vec![key("2026-02-05"), key("2026-02-04"), key("2026-02-03")]);
    assert_eq!(dates.latest_date, Some(key("2026-02-04")));

    let latest = engine.latest(None);
    assert_eq!(latest.selected_date, Some(key("2026-02-04")));
    assert_eq!(latest.filename.as_deref(), Some("c_2026-02-04.xlsx"));

    let picked = engine.latest(Some("2026-02-05"));
    assert_eq!(picked.selected_date, Some(key("2026-02-05")));
    assert!(picked.exists);

    // Not a date key: ignored, so the latest snapshot is returned
    let malformed = engine.latest(Some("05/02/2026"));
    assert_eq!(malformed.selected_date, Some(key("2026-02-04")));

    let unknown = engine.latest(Some("2020-01-01"));
    assert!(!unknown.exists);
    assert_eq!(unknown.date, None);
    assert_eq!(unknown.available_dates.len(), 3);
}

#[test]
fn test_empty_store() {
    let h = Harness::new();
    let engine = h.engine();

    assert_eq!(
        serde_json::to_value(engine.dates()).unwrap(),
        json!({ "dates": [], "latestDate": null })
    );
    let view = engine.latest(None);
    assert!(!view.exists);
    assert!(view.available_dates.is_empty());
}

#[test]
fn test_corrupt_store_reads_as_empty() {
    let h = Harness::new();
    let engine = h.engine();
    std::fs::write(h.data().join("latest.json"), "{\"snapshots\": ").unwrap();

    assert!(engine.dates().dates.is_empty());
}

#[test]
fn test_legacy_store_is_migrated_on_read() {
    let h = Harness::new();
    let engine = h.engine();
    std::fs::write(
        h.data().join("latest.json"),
        serde_json::to_string(&json!({
            "filename": "LCR.xlsx",
            "storedName": "20260131T090000Z_LCR.xlsx",
            "uploadedAt": "2026-01-31T09:00:00+00:00",
            "contentHash": "512-20260131T090000Z"
        }))
        .unwrap(),
    )
    .unwrap();

    let view = engine.latest(None);
    assert_eq!(view.date, Some(key("2026-01-31")));
    assert_eq!(view.processed_name.as_deref(), Some("latest.xlsx"));
    assert_eq!(view.content_hash.as_deref(), Some("512-20260131T090000Z"));
    assert_eq!(view.processing_mode, Some(ProcessingMode::ExcelCom));
    // The legacy artifact is not filed under history
    assert!(!view.exists);
    assert_eq!(view.file_url, None);
}

#[test]
fn test_dangling_latest_date_is_repaired() {
    let h = Harness::new().with_template();
    let engine = h.engine();
    engine.try_ingest(Upload::new(extract(), "x_2026-02-03.xlsx")).unwrap();

    let path = h.data().join("latest.json");
    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    doc["latestDate"] = json!("2030-12-31");
    std::fs::write(&path, doc.to_string()).unwrap();

    assert_eq!(engine.dates().latest_date, Some(key("2026-02-03")));
}

#[test]
fn test_history_file_validation() {
    let h = Harness::new().with_template();
    let engine = h.engine();

    for bad in ["../latest.json", "2026-02-04.xlsx/..", "latest.xlsx", "2026-2-4.xlsx", "2026-02-04.xls"] {
        let err = engine.history_file(bad).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "{bad}: {err:?}");
    }

    let err = engine.history_file("2026-02-04.xlsx").unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)), "{err:?}");

    engine.try_ingest(Upload::new(extract(), "x_2026-02-04.xlsx")).unwrap();
    assert_eq!(engine.history_file("2026-02-04.xlsx").unwrap(), h.history(DATE));
}
