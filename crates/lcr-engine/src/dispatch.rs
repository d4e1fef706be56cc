//! Choosing and running a processing strategy

use std::fmt;
use std::path::{Path, PathBuf};

use lcr_core::{DateKey, SheetLayout};
use lcr_excel_com::{AutomationJob, BridgeError, ExcelComBridge};
use lcr_xlsx::Patcher;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, Paths};
use crate::error::EngineResult;
use crate::reference::ReferenceResolver;
use crate::template::TemplateResolver;

/// How a snapshot's artifact was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingMode {
    /// Copied from a known-good result
    Reference,
    /// Patched natively
    Hardcoded,
    /// Produced by Excel automation
    #[default]
    ExcelCom,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Reference => "reference",
            ProcessingMode::Hardcoded => "hardcoded",
            ProcessingMode::ExcelCom => "excel-com",
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete plan for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Reference(PathBuf),
    NativePatch,
    ExternalAutomation,
}

impl Strategy {
    /// The mode recorded for artifacts produced by this strategy
    pub fn mode(&self) -> ProcessingMode {
        match self {
            Strategy::Reference(_) => ProcessingMode::Reference,
            Strategy::NativePatch => ProcessingMode::Hardcoded,
            Strategy::ExternalAutomation => ProcessingMode::ExcelCom,
        }
    }
}

/// Reference first, then native patching where the host supports it,
/// then external automation.
pub fn select_strategy(reference: Option<PathBuf>, native_supported: bool) -> Strategy {
    match reference {
        Some(path) => Strategy::Reference(path),
        None if native_supported => Strategy::NativePatch,
        None => Strategy::ExternalAutomation,
    }
}

/// Out-of-process copy-and-recalculate
pub trait Automation: Send + Sync {
    fn run(&self, job: &AutomationJob) -> Result<(), BridgeError>;
}

impl Automation for ExcelComBridge {
    fn run(&self, job: &AutomationJob) -> Result<(), BridgeError> {
        ExcelComBridge::run(self, job)
    }
}

/// Runs the selected strategy for one request.
///
/// Holds no per-request state.
pub struct Dispatcher {
    templates: TemplateResolver,
    references: ReferenceResolver,
    layout: SheetLayout,
    patcher: Patcher,
    automation: Box<dyn Automation>,
    native_supported: bool,
}

impl Dispatcher {
    pub fn new(config: &EngineConfig, paths: &Paths) -> Self {
        Self::with_automation(config, paths, Box::new(ExcelComBridge::new(config.excel.clone())))
    }

    /// Like [`Dispatcher::new`] with a substitute automation backend
    pub fn with_automation(
        config: &EngineConfig,
        paths: &Paths,
        automation: Box<dyn Automation>,
    ) -> Self {
        Self {
            templates: TemplateResolver::new(config, paths),
            references: ReferenceResolver::new(config, paths),
            layout: config.layout.clone(),
            patcher: Patcher::new(config.layout.clone()),
            automation,
            native_supported: config.native_patching,
        }
    }

    pub fn templates(&self) -> &TemplateResolver {
        &self.templates
    }

    pub fn references(&self) -> &ReferenceResolver {
        &self.references
    }

    /// The strategy a request for `date` would use right now
    pub fn strategy_for(&self, date: &DateKey) -> Strategy {
        select_strategy(self.references.resolve(date), self.native_supported)
    }

    /// Produce the artifact for `date` from `upload`, writing it to `out`.
    ///
    /// `out` is written in place; callers hand in a staging path and decide
    /// when it becomes visible.
    pub fn process(&self, upload: &Path, out: &Path, date: DateKey) -> EngineResult<ProcessingMode> {
        let strategy = self.strategy_for(&date);
        let mode = strategy.mode();
        tracing::info!(%date, %mode, "processing upload");

        match &strategy {
            Strategy::Reference(source) => {
                std::fs::copy(source, out)?;
            }
            Strategy::NativePatch => {
                let template = self.templates.resolve()?;
                let report = self.patcher.patch_file(upload, &template, out, date)?;
                tracing::debug!(
                    sheet = %report.sheet_path,
                    cells = report.cells_written,
                    strings_added = report.strings_added,
                    "native patch applied"
                );
            }
            Strategy::ExternalAutomation => {
                let template = self.templates.resolve()?;
                self.automation.run(&AutomationJob {
                    template_path: template,
                    input_path: upload.to_path_buf(),
                    output_path: out.to_path_buf(),
                    date_serial: date.serial(),
                    layout: self.layout.clone(),
                })?;
            }
        }

        Ok(mode)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("templates", &self.templates)
            .field("references", &self.references)
            .field("native_supported", &self.native_supported)
            .finish_non_exhaustive()
    }
}
