//! The persisted, date-keyed snapshot store

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use lcr_core::DateKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::ProcessingMode;
use crate::error::EngineResult;
use crate::fsutil::atomic_write_bytes;

/// Current shape of the persisted document
pub const STORE_VERSION: u64 = 2;

/// Processed name recorded for migrated single-snapshot documents
const LEGACY_PROCESSED_NAME: &str = "latest.xlsx";

/// Metadata for one date's produced artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub date: DateKey,
    pub filename: String,
    #[serde(default)]
    pub stored_name: Option<String>,
    pub processed_name: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub processing_mode: ProcessingMode,
}

/// All snapshots, keyed by date, plus the latest pointer.
///
/// `latest_date`, when set, is always a key of `snapshots`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotStore {
    latest_date: Option<DateKey>,
    snapshots: BTreeMap<DateKey, Snapshot>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document<'a> {
    version: u64,
    latest_date: Option<&'a DateKey>,
    snapshots: &'a BTreeMap<DateKey, Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store at `path`.
    ///
    /// A missing or unreadable file yields the empty store.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "snapshot store unreadable, starting empty: {e}");
                return Self::new();
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Self::from_json(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), "snapshot store corrupt, starting empty: {e}");
                Self::new()
            }
        }
    }

    /// Build a store from a persisted document of any known shape
    pub fn from_json(value: Value) -> Self {
        let Value::Object(mut doc) = value else {
            return Self::new();
        };

        if let Some(raw) = doc.remove("snapshots") {
            return Self::from_dated_map(raw, doc.get("latestDate"));
        }
        if doc.get("filename").and_then(Value::as_str).is_some_and(|s| !s.is_empty()) {
            return Self::migrate_legacy(&doc);
        }
        Self::new()
    }

    fn from_dated_map(raw: Value, latest: Option<&Value>) -> Self {
        let mut store = Self::new();
        if let Value::Object(entries) = raw {
            for (key, entry) in entries {
                let parsed = DateKey::parse(&key)
                    .map_err(|e| e.to_string())
                    .and_then(|date| {
                        serde_json::from_value::<Snapshot>(entry)
                            .map(|snapshot| (date, snapshot))
                            .map_err(|e| e.to_string())
                    });
                match parsed {
                    Ok((date, mut snapshot)) => {
                        snapshot.date = date;
                        store.snapshots.insert(date, snapshot);
                    }
                    Err(e) => tracing::warn!(key = %key, "skipping unreadable snapshot: {e}"),
                }
            }
        }

        store.latest_date = latest
            .and_then(Value::as_str)
            .and_then(|s| DateKey::parse(s).ok());
        store.repair_latest();
        store
    }

    fn migrate_legacy(doc: &serde_json::Map<String, Value>) -> Self {
        let text = |key: &str| doc.get(key).and_then(Value::as_str).map(str::to_string);

        let (uploaded_raw, uploaded_at) = match text("uploadedAt") {
            Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(at) => (raw, at.with_timezone(&Utc)),
                Err(_) => (raw, Utc::now()),
            },
            None => {
                let now = Utc::now();
                (now.to_rfc3339(), now)
            }
        };

        // The key is the date as written, before any time zone conversion.
        let date = match uploaded_raw.get(..10).map(DateKey::parse) {
            Some(Ok(date)) => date,
            _ => {
                tracing::warn!(uploaded_at = %uploaded_raw, "legacy snapshot has no usable date");
                return Self::new();
            }
        };

        tracing::info!(%date, "migrating legacy single-snapshot store");
        let mut store = Self::new();
        store.upsert(Snapshot {
            date,
            filename: text("filename").unwrap_or_default(),
            stored_name: text("storedName"),
            processed_name: LEGACY_PROCESSED_NAME.to_string(),
            uploaded_at,
            content_hash: text("contentHash"),
            processing_mode: ProcessingMode::ExcelCom,
        });
        store
    }

    /// Point `latest_date` at the greatest key if it does not name a snapshot
    fn repair_latest(&mut self) {
        let valid = self
            .latest_date
            .is_some_and(|d| self.snapshots.contains_key(&d));
        if !valid {
            self.latest_date = self.snapshots.keys().next_back().copied();
        }
    }

    /// Serialize the whole store
    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(&Document {
            version: STORE_VERSION,
            latest_date: self.latest_date.as_ref(),
            snapshots: &self.snapshots,
        })?)
    }

    /// Replace the persisted state at `path` with this store
    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        atomic_write_bytes(path, self.to_json()?.as_bytes())
    }

    /// Insert or replace the snapshot for its date and make it the latest
    pub fn upsert(&mut self, snapshot: Snapshot) {
        let date = snapshot.date;
        self.snapshots.insert(date, snapshot);
        self.latest_date = Some(date);
    }

    /// The snapshot for `date`, or the latest one when `date` is `None`
    pub fn get(&self, date: Option<&DateKey>) -> Option<&Snapshot> {
        let date = date.or(self.latest_date.as_ref())?;
        self.snapshots.get(date)
    }

    pub fn latest_date(&self) -> Option<DateKey> {
        self.latest_date
    }

    /// Every date with a snapshot, newest first
    pub fn list_dates(&self) -> Vec<DateKey> {
        self.snapshots.keys().rev().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
