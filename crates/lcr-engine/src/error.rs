//! Engine error types

use std::path::PathBuf;

use lcr_excel_com::BridgeError;
use lcr_xlsx::XlsxError;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine.
///
/// A corrupt snapshot store is deliberately absent: it is recovered as an
/// empty store when loaded.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No template could be found in any of the searched locations
    #[error("Base template not found. Place it at data/base_template.xlsx or set BASE_TEMPLATE_PATH.")]
    TemplateNotFound { searched: Vec<PathBuf> },

    /// The request was rejected before any processing
    #[error("{0}")]
    Validation(String),

    /// A requested artifact does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid environment or configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Native patching failed
    #[error(transparent)]
    Xlsx(#[from] XlsxError),

    /// The Excel automation host failed
    #[error(transparent)]
    Automation(#[from] BridgeError),

    /// Core error
    #[error(transparent)]
    Core(#[from] lcr_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the request was rejected as malformed input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_) | EngineError::Core(lcr_core::Error::InvalidDateKey(_))
        )
    }
}
