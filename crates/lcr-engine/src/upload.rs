//! Inbound uploads: framing checks, file names and date keys

use lazy_regex::regex_replace_all;
use lcr_core::DateKey;

use crate::error::{EngineError, EngineResult};

const DEFAULT_FILENAME: &str = "upload.xlsx";
const UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// A raw upload as received from the transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upload {
    pub bytes: Vec<u8>,
    /// Client-supplied file name, untrusted
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// Length the client announced, when the transport knows it
    pub declared_length: Option<u64>,
    /// Explicit `YYYY-MM-DD` key overriding inference
    pub date: Option<String>,
}

impl Upload {
    /// An octet-stream upload whose declared length matches its body
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            declared_length: Some(bytes.len() as u64),
            bytes,
            filename: Some(filename.into()),
            content_type: Some(UPLOAD_CONTENT_TYPE.to_string()),
            date: None,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Reject malformed framing before anything touches disk
    pub fn validate(&self) -> EngineResult<()> {
        let length = self.declared_length.unwrap_or(self.bytes.len() as u64);
        if length == 0 {
            return Err(EngineError::Validation("Empty request body.".into()));
        }

        let content_type = self.content_type.as_deref().unwrap_or_default();
        if !content_type.contains(UPLOAD_CONTENT_TYPE) {
            return Err(EngineError::Validation("Use application/octet-stream upload.".into()));
        }

        if self.bytes.len() as u64 != length {
            return Err(EngineError::Validation("Upload interrupted.".into()));
        }
        Ok(())
    }

    /// The client's file name, made safe to store
    pub fn safe_filename(&self) -> String {
        sanitize_filename(self.filename.as_deref().unwrap_or(DEFAULT_FILENAME))
    }

    /// The explicit date if one was given, else one found in `filename`, else today
    pub fn date_key(&self, filename: &str) -> EngineResult<DateKey> {
        match self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => DateKey::parse(raw)
                .map_err(|_| EngineError::Validation(format!("Invalid date '{raw}'. Use YYYY-MM-DD."))),
            None => Ok(DateKey::from_filename(filename).unwrap_or_else(DateKey::today)),
        }
    }
}

/// Reduce a client file name to a safe `.xlsx` basename
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let replaced = regex_replace_all!(r"[^A-Za-z0-9._-]", base, "_");
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c == '_');

    let mut safe = if trimmed.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        trimmed.to_string()
    };
    if !safe.to_ascii_lowercase().ends_with(".xlsx") {
        safe.push_str(".xlsx");
    }
    safe
}
