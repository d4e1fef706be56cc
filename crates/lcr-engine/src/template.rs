//! Locating the workbook every snapshot is patched into

use std::path::PathBuf;

use crate::config::{EngineConfig, Paths};
use crate::error::{EngineError, EngineResult};
use crate::search;

/// Prior uploads whose name carries this date are copies of the template
const UPLOAD_TEMPLATE_PATTERN: &str = "*04022026*.xlsx";

/// Download-area names, most specific first
const DOWNLOAD_TEMPLATE_PATTERNS: [&str; 2] = [
    "LCR Management_(GBS)_04022026.xlsx",
    "LCR Management_(GBS)_*.xlsx",
];

/// Finds the template by priority.
///
/// 1. the configured override, if the file exists
/// 2. `base_template.xlsx` in the data directory
/// 3. the most recently modified matching prior upload
/// 4. the download area, searched recursively, most specific pattern first
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    override_path: Option<PathBuf>,
    base_template: PathBuf,
    uploads_dir: PathBuf,
    download_dir: Option<PathBuf>,
}

impl TemplateResolver {
    pub fn new(config: &EngineConfig, paths: &Paths) -> Self {
        Self {
            override_path: config.template_override.clone(),
            base_template: paths.base_template(),
            uploads_dir: paths.uploads_dir.clone(),
            download_dir: config.download_dir.clone(),
        }
    }

    /// Resolve the template, or fail with [`EngineError::TemplateNotFound`]
    pub fn resolve(&self) -> EngineResult<PathBuf> {
        let mut searched = Vec::new();

        if let Some(path) = &self.override_path {
            if path.is_file() {
                return Ok(self.found(path.clone(), "override"));
            }
            searched.push(path.clone());
        }

        if self.base_template.is_file() {
            return Ok(self.found(self.base_template.clone(), "data directory"));
        }
        searched.push(self.base_template.clone());

        if let Some(path) = search::newest(search::files_in(&self.uploads_dir, UPLOAD_TEMPLATE_PATTERN)) {
            return Ok(self.found(path, "prior upload"));
        }
        searched.push(self.uploads_dir.join(UPLOAD_TEMPLATE_PATTERN));

        if let Some(downloads) = &self.download_dir {
            for pattern in DOWNLOAD_TEMPLATE_PATTERNS {
                if let Some(path) = search::files_under(downloads, pattern).into_iter().next() {
                    return Ok(self.found(path, "download area"));
                }
                searched.push(downloads.join("**").join(pattern));
            }
        }

        tracing::warn!(locations = searched.len(), "no template found");
        Err(EngineError::TemplateNotFound { searched })
    }

    fn found(&self, path: PathBuf, source: &str) -> PathBuf {
        tracing::debug!(template = %path.display(), source, "resolved template");
        path
    }
}
