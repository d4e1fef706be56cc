//! JSON shapes returned to clients

use chrono::{DateTime, Utc};
use lcr_core::DateKey;
use serde::Serialize;

use crate::config::Paths;
use crate::dispatch::ProcessingMode;
use crate::store::Snapshot;

/// URL prefix history artifacts are served under
pub const HISTORY_URL_PREFIX: &str = "/data/history/";

/// One snapshot and the dates around it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotView {
    /// Whether the snapshot's artifact is present in history
    pub exists: bool,
    pub date: Option<DateKey>,
    pub filename: Option<String>,
    pub stored_name: Option<String>,
    pub processed_name: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub content_hash: Option<String>,
    pub processing_mode: Option<ProcessingMode>,
    pub file_url: Option<String>,
    pub available_dates: Vec<DateKey>,
    pub selected_date: Option<DateKey>,
}

impl SnapshotView {
    /// The view of `snapshot`, checking its artifact under `paths`
    pub fn build(snapshot: Option<&Snapshot>, available_dates: Vec<DateKey>, paths: &Paths) -> Self {
        let Some(snapshot) = snapshot else {
            return Self::empty(available_dates);
        };

        let processed = &snapshot.processed_name;
        let exists = !processed.is_empty() && paths.history_dir.join(processed).is_file();

        Self {
            exists,
            date: Some(snapshot.date),
            filename: Some(snapshot.filename.clone()),
            stored_name: snapshot.stored_name.clone(),
            processed_name: Some(processed.clone()),
            uploaded_at: Some(snapshot.uploaded_at),
            content_hash: snapshot.content_hash.clone(),
            processing_mode: Some(snapshot.processing_mode),
            file_url: exists.then(|| format!("{HISTORY_URL_PREFIX}{processed}")),
            available_dates,
            selected_date: Some(snapshot.date),
        }
    }

    /// No snapshot selected
    pub fn empty(available_dates: Vec<DateKey>) -> Self {
        Self {
            exists: false,
            date: None,
            filename: None,
            stored_name: None,
            processed_name: None,
            uploaded_at: None,
            content_hash: None,
            processing_mode: None,
            file_url: None,
            available_dates,
            selected_date: None,
        }
    }
}

/// Result of one upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub snapshot: Option<SnapshotView>,
}

impl UploadOutcome {
    pub fn accepted(view: SnapshotView) -> Self {
        Self {
            ok: true,
            error: None,
            snapshot: Some(view),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            snapshot: None,
        }
    }
}

/// Every known date, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatesView {
    pub dates: Vec<DateKey>,
    pub latest_date: Option<DateKey>,
}
