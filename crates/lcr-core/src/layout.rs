//! Where the daily extract is read from and where it lands in the template

use crate::cell::{CellAddress, CellRange};

/// Fixed geometry of the merge.
///
/// Rows above `target_anchor` in the target sheet hold headers and formulas
/// and are never touched; only the block starting at the anchor is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    /// Worksheet in the template that receives the extract
    pub target_sheet: String,
    /// Bounded window read from the first sheet of the upload
    pub source_range: CellRange,
    /// Top-left cell of the pasted block in the target sheet
    pub target_anchor: CellAddress,
    /// Header cell that receives the date serial
    pub date_cell: CellAddress,
}

impl SheetLayout {
    /// Number of extract rows (699 for the default window)
    pub fn row_count(&self) -> u32 {
        self.source_range.row_count()
    }

    /// Number of extract columns (11 for the default window)
    pub fn col_count(&self) -> u16 {
        self.source_range.col_count()
    }

    /// Target cell for extract row `i` and column `c`, both 0-based
    pub fn target_cell(&self, i: u32, c: u16) -> CellAddress {
        self.target_anchor.offset(i, c)
    }

    /// Target columns as an A1 column span, e.g. `A7:K1048576`
    pub fn target_clear_range(&self) -> CellRange {
        let last_col = self.target_anchor.col + self.col_count() - 1;
        CellRange::new(
            self.target_anchor,
            CellAddress::new(crate::MAX_ROWS - 1, last_col),
        )
    }
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            target_sheet: "BS_RE33".to_string(),
            source_range: CellRange::new(CellAddress::new(1, 0), CellAddress::new(699, 10)),
            target_anchor: CellAddress::new(6, 0),
            date_cell: CellAddress::new(3, 13),
        }
    }
}
