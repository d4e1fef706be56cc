//! XLSX error types

use thiserror::Error;

/// Result type for XLSX operations
pub type XlsxResult<T> = std::result::Result<T, XlsxError>;

/// Errors that can occur while reading or patching a package
#[derive(Debug, Error)]
pub enum XlsxError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The compressed bundle could not be read or written
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A part is not well-formed XML
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Invalid file format
    #[error("Invalid XLSX format: {0}")]
    InvalidFormat(String),

    /// Missing required part
    #[error("Missing required part: {0}")]
    MissingPart(String),

    /// No declared sheet has this name, or its relationship is missing
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// 1-based sheet position outside `[1, count]`
    #[error("Invalid sheet index {index} (workbook declares {count} sheets)")]
    InvalidSheetIndex { index: usize, count: usize },

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] lcr_core::Error),
}

impl XlsxError {
    /// Whether this error means the bundle itself is unreadable or malformed
    pub fn is_archive_corrupt(&self) -> bool {
        matches!(
            self,
            XlsxError::Zip(_)
                | XlsxError::Xml(_)
                | XlsxError::InvalidFormat(_)
                | XlsxError::MissingPart(_)
        )
    }
}
