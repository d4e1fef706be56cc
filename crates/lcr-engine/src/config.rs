//! Engine configuration and the resolved path context

use std::path::{Path, PathBuf};
use std::time::Duration;

use lcr_core::{DateKey, SheetLayout};
use lcr_excel_com::ExcelComConfig;

use crate::error::{EngineError, EngineResult};

/// Template override path
pub const ENV_TEMPLATE: &str = "BASE_TEMPLATE_PATH";
/// Reference-results directory override
pub const ENV_REFERENCE_DIR: &str = "REFERENCE_RESULTS_DIR";
/// `native` or `excel-com`
pub const ENV_PROCESSING_MODE: &str = "LCR_PROCESSING_MODE";
/// Automation timeout in seconds
pub const ENV_AUTOMATION_TIMEOUT: &str = "LCR_AUTOMATION_TIMEOUT_SECS";

/// Everything the engine needs to know about its host.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the engine's persisted state
    pub data_dir: PathBuf,
    /// Explicit template, tried first when it exists
    pub template_override: Option<PathBuf>,
    /// Explicit reference-results directory, searched first
    pub reference_dir: Option<PathBuf>,
    /// The user's download area, searched last for templates and references
    pub download_dir: Option<PathBuf>,
    /// Whether the package can be patched natively on this host
    pub native_patching: bool,
    /// Sheet geometry, for both native patching and automation jobs
    pub layout: SheetLayout,
    /// Automation host settings
    pub excel: ExcelComConfig,
}

impl EngineConfig {
    /// Defaults rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            template_override: None,
            reference_dir: None,
            download_dir: default_download_dir(),
            native_patching: true,
            layout: SheetLayout::default(),
            excel: ExcelComConfig::default(),
        }
    }

    /// Defaults overridden by the process environment
    pub fn from_env(data_dir: impl Into<PathBuf>) -> EngineResult<Self> {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, which plays the role of the environment
    pub fn from_lookup<F>(data_dir: impl Into<PathBuf>, lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(data_dir);
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(ENV_TEMPLATE) {
            config.template_override = Some(expand_home(&path));
        }
        if let Some(path) = get(ENV_REFERENCE_DIR) {
            config.reference_dir = Some(expand_home(&path));
        }
        if let Some(mode) = get(ENV_PROCESSING_MODE) {
            config.native_patching = match mode.trim() {
                "native" => true,
                "excel-com" => false,
                other => {
                    return Err(EngineError::Config(format!(
                        "{ENV_PROCESSING_MODE} must be 'native' or 'excel-com', got '{other}'"
                    )))
                }
            };
        }
        if let Some(secs) = get(ENV_AUTOMATION_TIMEOUT) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                EngineError::Config(format!("{ENV_AUTOMATION_TIMEOUT} must be a number of seconds, got '{secs}'"))
            })?;
            config.excel.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// The path context for this configuration
    pub fn paths(&self) -> Paths {
        Paths::new(&self.data_dir)
    }
}

/// Every location the engine reads or writes, resolved once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub history_dir: PathBuf,
    pub state_file: PathBuf,
    pub latest_file: PathBuf,
}

impl Paths {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            uploads_dir: data_dir.join("uploads"),
            history_dir: data_dir.join("history"),
            state_file: data_dir.join("latest.json"),
            latest_file: data_dir.join("latest.xlsx"),
            data_dir,
        }
    }

    /// Create the data, uploads and history directories
    pub fn ensure_dirs(&self) -> EngineResult<()> {
        for dir in [&self.data_dir, &self.uploads_dir, &self.history_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// The template kept in the data directory
    pub fn base_template(&self) -> PathBuf {
        self.data_dir.join("base_template.xlsx")
    }

    /// Fixed reference-results directories under the data directory
    pub fn reference_fallbacks(&self) -> [PathBuf; 2] {
        [self.data_dir.join("reference"), self.data_dir.join("results")]
    }

    /// Name of the artifact for `date`
    pub fn history_name(date: &DateKey) -> String {
        format!("{date}.xlsx")
    }

    /// Path of the artifact for `date`
    pub fn history_file(&self, date: &DateKey) -> PathBuf {
        self.history_dir.join(Self::history_name(date))
    }
}

fn default_download_dir() -> Option<PathBuf> {
    dirs::download_dir().or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> PathBuf {
    let path = path.trim();
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\"))
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
