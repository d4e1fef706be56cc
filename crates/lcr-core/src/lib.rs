//! # lcr-core
//!
//! Core types shared by the LCR snapshot engine crates:
//! - [`CellAddress`] and [`CellRange`] - A1-style cell addressing
//! - [`DateKey`] - the `YYYY-MM-DD` key every snapshot is filed under, and its
//!   spreadsheet date serial
//! - [`SheetLayout`] - where the daily extract lives and where it lands in the template
//!
//! ## Example
//!
//! ```rust
//! use lcr_core::{CellAddress, DateKey};
//!
//! let key: DateKey = "2024-01-01".parse().unwrap();
//! assert_eq!(key.serial(), 45292);
//!
//! let addr = CellAddress::parse("K7").unwrap();
//! assert_eq!(addr.col, 10);
//! ```

pub mod cell;
pub mod date;
pub mod error;
pub mod layout;

pub use cell::{CellAddress, CellRange};
pub use date::DateKey;
pub use error::{Error, Result};
pub use layout::SheetLayout;

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;
