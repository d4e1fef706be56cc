//! The bounded grid read from an uploaded extract

use std::path::Path;

use lcr_core::CellRange;

use crate::error::XlsxResult;
use crate::package::Package;
use crate::sheet;

/// Trimmed text values of a fixed window of the upload's first sheet.
///
/// Every position of the window is present; missing cells are empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extract {
    rows: Vec<Vec<String>>,
    cols: usize,
}

impl Extract {
    /// Read `range` from the first sheet of the workbook at `path`
    pub fn read_file<P: AsRef<Path>>(path: P, range: &CellRange) -> XlsxResult<Self> {
        let package = Package::open(path)?;
        Self::from_package(&package, range)
    }

    /// Read `range` from the first sheet of an opened package
    pub fn from_package(package: &Package, range: &CellRange) -> XlsxResult<Self> {
        let sheet_path = package.resolve_sheet_by_index(1)?;
        let table = package.shared_strings()?;

        let cols = range.col_count() as usize;
        let mut rows = vec![vec![String::new(); cols]; range.row_count() as usize];
        let mut filled = 0usize;

        for (address, cell) in sheet::read_cells(package.required_part(&sheet_path)?)? {
            if !range.contains(&address) {
                continue;
            }
            let text = cell.text(&table);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let i = (address.row - range.start.row) as usize;
            let c = (address.col - range.start.col) as usize;
            rows[i][c] = text.to_string();
            filled += 1;
        }

        log::debug!("extracted {range} from {sheet_path}: {filled} non-empty cells");
        Ok(Self { rows, cols })
    }

    /// Build an extract from in-memory rows; short rows are padded with empty text
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(cols, String::new());
                row
            })
            .collect();
        Self { rows, cols }
    }

    /// Text at 0-based row `i`, column `c`; empty outside the grid
    pub fn get(&self, i: usize, c: usize) -> &str {
        self.rows
            .get(i)
            .and_then(|row| row.get(c))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns
    pub fn col_count(&self) -> usize {
        self.cols
    }

    /// Rows in order
    pub fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().map(Vec::as_slice)
    }
}
