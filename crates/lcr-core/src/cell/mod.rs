//! Cell addressing

mod address;

pub use address::{CellAddress, CellRange};
