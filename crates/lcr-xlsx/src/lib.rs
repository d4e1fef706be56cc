//! # lcr-xlsx
//!
//! Cell-level patching of XLSX packages without a spreadsheet application.
//!
//! The package is held in memory as a map of part name to bytes. Only the
//! parts a patch touches (the target worksheet and the shared-string table,
//! plus the relationship/content-type parts when a shared-string table has to
//! be synthesized) are rewritten; everything else is re-packed byte for byte.
//!
//! ```rust,no_run
//! use lcr_core::{DateKey, SheetLayout};
//! use lcr_xlsx::Patcher;
//!
//! # fn main() -> lcr_xlsx::XlsxResult<()> {
//! let patcher = Patcher::new(SheetLayout::default());
//! let date: DateKey = "2026-02-04".parse().unwrap();
//! let report = patcher.patch_file("upload.xlsx", "template.xlsx", "out.xlsx", date)?;
//! println!("wrote {} cells", report.cells_written);
//! # Ok(())
//! # }
//! ```

pub mod cell;
pub mod error;
pub mod extract;
pub mod formula;
pub mod package;
pub mod patcher;
pub mod shared_strings;
pub mod sheet;

pub use cell::{CellContent, RawCell};
pub use error::{XlsxError, XlsxResult};
pub use extract::Extract;
pub use package::{Package, SheetEntry};
pub use patcher::{PatchReport, Patcher};
pub use shared_strings::SharedStrings;
