//! End-to-end tests for lcr-xlsx.
//!
//! Every test builds the workbooks it needs in a temp directory, runs the
//! package reader or the patcher over them, then reopens the result and
//! asserts on the parts and cells.

mod package;
mod patching;

pub use common::*;
