//! Excel COM automation through a PowerShell control script.
//!
//! Used where the workbook has to be produced by Excel itself rather than by
//! patching the package directly. Each run is a single blocking PowerShell
//! process that opens the template and the upload, pastes the extract values,
//! writes the date serial, forces a full rebuild and saves to the output path.
//!
//! # Architecture
//!
//! ```text
//! ExcelComBridge (this crate)
//!     └── spawns: powershell -File lcr-excel-XXXX.ps1
//!           └── COM: Excel.Application
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use lcr_core::SheetLayout;
//! use lcr_excel_com::{AutomationJob, ExcelComBridge, ExcelComConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = ExcelComBridge::new(ExcelComConfig::default());
//!     bridge.run(&AutomationJob {
//!         template_path: "template.xlsx".into(),
//!         input_path: "upload.xlsx".into(),
//!         output_path: "2026-02-04.xlsx".into(),
//!         date_serial: 46057,
//!         layout: SheetLayout::default(),
//!     })?;
//!     Ok(())
//! }
//! ```

mod bridge;
mod script;

pub use bridge::{AutomationJob, BridgeError, ExcelComBridge, ExcelComConfig};
pub use script::CONTROL_SCRIPT;
