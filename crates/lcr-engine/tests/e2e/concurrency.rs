//! Simultaneous uploads and readers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use lcr_core::DateKey;
use lcr_engine::{SnapshotStore, Upload};
use lcr_xlsx::Package;
use pretty_assertions::assert_eq;

use crate::common::*;

const UPLOADERS: usize = 8;

#[test]
fn test_same_date_uploads_leave_one_complete_snapshot() {
    let h = Harness::new().with_template();
    let engine = Arc::new(h.engine());
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let (engine, done) = (engine.clone(), done.clone());
        let history = h.history(DATE);
        thread::spawn(move || {
            let mut checked = 0usize;
            while !done.load(Ordering::SeqCst) {
                if engine.latest(Some(DATE)).exists {
                    // Whatever is visible must be a whole workbook
                    Package::open(&history).unwrap();
                    checked += 1;
                }
            }
            checked
        })
    };

    let uploaders: Vec<_> = (0..UPLOADERS)
        .map(|i| {
            let engine = engine.clone();
            thread::spawn(move || {
                engine
                    .try_ingest(Upload::new(extract(), format!("run{i}_2026-02-04.xlsx")))
                    .unwrap()
            })
        })
        .collect();
    let views: Vec<_> = uploaders.into_iter().map(|t| t.join().unwrap()).collect();
    done.store(true, Ordering::SeqCst);
    reader.join().unwrap();

    assert!(views.iter().all(|v| v.exists));

    let store = SnapshotStore::load(h.data().join("latest.json"));
    assert_eq!(store.list_dates(), vec![DateKey::parse(DATE).unwrap()]);

    let kept = store.get(None).unwrap();
    assert!(kept.filename.starts_with("run"), "{}", kept.filename);
    assert_eq!(
        sheet_text(&h.history(DATE), "BS_RE33")[2],
        ("A7".to_string(), "HQLA Level 1".to_string())
    );

    let history: Vec<_> = std::fs::read_dir(h.data().join("history"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(history, vec!["2026-02-04.xlsx".to_string()]);
}

#[test]
fn test_different_dates_all_recorded() {
    let h = Harness::new().with_template();
    let engine = Arc::new(h.engine());

    let handles: Vec<_> = (1..=6)
        .map(|day| {
            let engine = engine.clone();
            thread::spawn(move || {
                engine
                    .try_ingest(Upload::new(extract(), format!("LCR_2026-02-0{day}.xlsx")))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let dates = engine.dates();
    assert_eq!(dates.dates.len(), 6);
    assert_eq!(dates.dates[0], DateKey::parse("2026-02-06").unwrap());
    for day in 1..=6 {
        assert!(h.history(&format!("2026-02-0{day}")).is_file());
    }
}
