//! # lcr-engine
//!
//! Turns daily LCR extracts into dated snapshot workbooks.
//!
//! Each upload is routed to one of three strategies:
//! - a known-good **reference** result for the date, copied as is
//! - the native OOXML patcher from [`lcr_xlsx`] (`hardcoded`)
//! - Excel automation through [`lcr_excel_com`] (`excel-com`)
//!
//! The produced artifact is filed under `history/{date}.xlsx`, copied to the
//! rolling `latest.xlsx`, and recorded in the date-keyed [`SnapshotStore`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use lcr_engine::{Engine, EngineConfig, Upload};
//!
//! let config = EngineConfig::from_env("data")?;
//! let engine = Engine::new(&config)?;
//!
//! let bytes = std::fs::read("LCR_2026-02-04.xlsx")?;
//! let outcome = engine.ingest(Upload::new(bytes, "LCR_2026-02-04.xlsx"));
//! println!("{}", serde_json::to_string_pretty(&outcome)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fsutil;
pub mod locks;
pub mod reference;
pub mod search;
pub mod store;
pub mod template;
pub mod upload;
pub mod view;

pub use config::{EngineConfig, Paths};
pub use dispatch::{select_strategy, Automation, Dispatcher, ProcessingMode, Strategy};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use reference::ReferenceResolver;
pub use store::{Snapshot, SnapshotStore};
pub use template::TemplateResolver;
pub use upload::{sanitize_filename, Upload};
pub use view::{DatesView, SnapshotView, UploadOutcome};
