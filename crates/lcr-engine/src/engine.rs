//! The ingest service and its read-side queries

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use lazy_regex::regex_is_match;
use lcr_core::DateKey;

use crate::config::{EngineConfig, Paths};
use crate::dispatch::{Automation, Dispatcher};
use crate::error::{EngineError, EngineResult};
use crate::fsutil::{atomic_write_bytes, Installed, Staged};
use crate::locks::KeyedLocks;
use crate::store::{Snapshot, SnapshotStore};
use crate::upload::Upload;
use crate::view::{DatesView, SnapshotView, UploadOutcome};

/// Turns uploads into dated snapshots and answers queries about them.
///
/// Uploads for the same date are processed one at a time; uploads for
/// different dates only share the short store update. Queries never wait on
/// processing.
#[derive(Debug)]
pub struct Engine {
    paths: Paths,
    dispatcher: Dispatcher,
    store_lock: Mutex<()>,
    date_locks: KeyedLocks<DateKey>,
}

impl Engine {
    /// Create the engine, creating its directories
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let paths = config.paths();
        let dispatcher = Dispatcher::new(config, &paths);
        Self::from_parts(paths, dispatcher)
    }

    /// Like [`Engine::new`] with a substitute automation backend
    pub fn with_automation(config: &EngineConfig, automation: Box<dyn Automation>) -> EngineResult<Self> {
        let paths = config.paths();
        let dispatcher = Dispatcher::with_automation(config, &paths, automation);
        Self::from_parts(paths, dispatcher)
    }

    fn from_parts(paths: Paths, dispatcher: Dispatcher) -> EngineResult<Self> {
        paths.ensure_dirs()?;
        Ok(Self {
            paths,
            dispatcher,
            store_lock: Mutex::new(()),
            date_locks: KeyedLocks::new(),
        })
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Process `upload`, reporting failures in the outcome
    pub fn ingest(&self, upload: Upload) -> UploadOutcome {
        match self.try_ingest(upload) {
            Ok(view) => UploadOutcome::accepted(view),
            Err(e) if e.is_validation() => UploadOutcome::rejected(e.to_string()),
            Err(e) => {
                tracing::error!("upload failed: {e}");
                UploadOutcome::rejected(format!("Failed to process workbook: {e}"))
            }
        }
    }

    /// Process `upload` into the snapshot for its date.
    ///
    /// On error the history artifact, the rolling copy and the store are as
    /// they were before the call.
    pub fn try_ingest(&self, upload: Upload) -> EngineResult<SnapshotView> {
        upload.validate()?;
        let filename = upload.safe_filename();
        let date = upload.date_key(&filename)?;

        let uploaded_at = Utc::now();
        let stamp = uploaded_at.format("%Y%m%dT%H%M%SZ").to_string();
        let stored_name = format!("{stamp}_{filename}");

        let date_lock = self.date_locks.lock_for(&date);
        let _date_guard = date_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let stored_path = self.paths.uploads_dir.join(&stored_name);
        atomic_write_bytes(&stored_path, &upload.bytes)?;

        let processed_name = Paths::history_name(&date);
        let artifact = Staged::new(self.paths.history_dir.join(&processed_name), ".xlsx")?;
        let mode = self.dispatcher.process(&stored_path, artifact.path(), date)?;

        let rolling = Staged::new(&self.paths.latest_file, ".xlsx")?;
        std::fs::copy(artifact.path(), rolling.path())?;

        let snapshot = Snapshot {
            date,
            filename: filename.clone(),
            stored_name: Some(stored_name),
            processed_name,
            uploaded_at,
            content_hash: Some(format!("{}-{stamp}", upload.bytes.len())),
            processing_mode: mode,
        };

        let view = {
            let _store_guard = self.store_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut store = SnapshotStore::load(&self.paths.state_file);
            store.upsert(snapshot);
            let state = Staged::with_bytes(&self.paths.state_file, store.to_json()?.as_bytes())?;

            commit(artifact, rolling, state)?;
            SnapshotView::build(store.get(Some(&date)), store.list_dates(), &self.paths)
        };

        tracing::info!(%date, %mode, filename = %filename, "snapshot stored");
        Ok(view)
    }

    /// The snapshot for `requested`, or the latest one.
    ///
    /// A requested date that is not a `YYYY-MM-DD` key is ignored.
    pub fn latest(&self, requested: Option<&str>) -> SnapshotView {
        let requested = requested.and_then(|raw| DateKey::parse(raw.trim()).ok());
        let store = SnapshotStore::load(&self.paths.state_file);
        SnapshotView::build(store.get(requested.as_ref()), store.list_dates(), &self.paths)
    }

    /// Every known date
    pub fn dates(&self) -> DatesView {
        let store = SnapshotStore::load(&self.paths.state_file);
        DatesView {
            dates: store.list_dates(),
            latest_date: store.latest_date(),
        }
    }

    /// Path of a history artifact named `name`, validated before any file access
    pub fn history_file(&self, name: &str) -> EngineResult<PathBuf> {
        if !regex_is_match!(r"^\d{4}-\d{2}-\d{2}\.xlsx$", name) {
            return Err(EngineError::Validation(format!("Invalid history file name '{name}'.")));
        }
        let path = self.paths.history_dir.join(name);
        if !path.is_file() {
            return Err(EngineError::NotFound(name.to_string()));
        }
        Ok(path)
    }
}

/// Install the artifact and the rolling copy, then the store, which is the
/// commit point. A failure reverts whatever was already installed.
fn commit(artifact: Staged, rolling: Staged, state: Staged) -> EngineResult<()> {
    let artifact = artifact.install()?;
    let rolling = match rolling.install() {
        Ok(rolling) => rolling,
        Err(e) => {
            revert_all([artifact]);
            return Err(e);
        }
    };
    if let Err(e) = state.persist() {
        revert_all([rolling, artifact]);
        return Err(e);
    }
    Ok(())
}

fn revert_all<const N: usize>(installed: [Installed; N]) {
    for file in installed {
        let dest = file.dest().to_path_buf();
        if let Err(e) = file.revert() {
            tracing::error!(path = %dest.display(), "failed to revert after an aborted ingest: {e}");
        }
    }
}
