//! Known-good results for a date, used instead of patching

use std::path::PathBuf;

use lcr_core::DateKey;

use crate::config::{EngineConfig, Paths};
use crate::search;

/// Searches reference-results directories for a date's output.
///
/// Directories are searched in order: the configured override, then
/// `reference/` and `results/` under the data directory, then the download
/// area recursively. History artifacts are never references.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    dirs: Vec<PathBuf>,
    download_dir: Option<PathBuf>,
}

impl ReferenceResolver {
    pub fn new(config: &EngineConfig, paths: &Paths) -> Self {
        let dirs = config
            .reference_dir
            .iter()
            .cloned()
            .chain(paths.reference_fallbacks())
            .collect();
        Self {
            dirs,
            download_dir: config.download_dir.clone(),
        }
    }

    /// Directories searched before the download area
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// First reference result for `date`, if any
    pub fn resolve(&self, date: &DateKey) -> Option<PathBuf> {
        let iso = date.to_string();
        let dmy = date.to_dmy_compact();

        let dir_patterns = [
            format!("{iso}.xlsx"),
            format!("*{iso}*.xlsx"),
            format!("*{dmy}*.xlsx"),
        ];
        for dir in &self.dirs {
            for pattern in &dir_patterns {
                if let Some(path) = search::files_in(dir, pattern).into_iter().next() {
                    tracing::debug!(%date, reference = %path.display(), "found reference result");
                    return Some(path);
                }
            }
        }

        let downloads = self.download_dir.as_ref()?;
        let download_patterns = [
            format!("LCR Management*{dmy}*.xlsx"),
            format!("LCR Management*{iso}*.xlsx"),
        ];
        for pattern in &download_patterns {
            if let Some(path) = search::files_under(downloads, pattern).into_iter().next() {
                tracing::debug!(%date, reference = %path.display(), "found reference result in downloads");
                return Some(path);
            }
        }
        None
    }
}
