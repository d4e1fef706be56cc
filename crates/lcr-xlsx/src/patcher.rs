//! Merge an extract into the template's target sheet

use std::collections::BTreeMap;
use std::path::Path;

use lcr_core::{DateKey, SheetLayout};

use crate::cell::CellContent;
use crate::error::XlsxResult;
use crate::extract::Extract;
use crate::package::Package;
use crate::shared_strings::SharedStrings;
use crate::sheet;

/// What a patch changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    /// Worksheet part that was rewritten
    pub sheet_path: String,
    /// Cells written or cleared, the date cell included
    pub cells_written: usize,
    /// Entries appended to the shared-string table
    pub strings_added: usize,
    /// Final size of the shared-string table
    pub shared_strings: usize,
    /// Overwritten cells that held a formula
    pub formulas_cleared: usize,
    /// Shared-formula dependents rewritten after their master was overwritten
    pub formulas_detached: usize,
}

/// Native (no spreadsheet application) patcher
#[derive(Debug, Clone, Default)]
pub struct Patcher {
    layout: SheetLayout,
}

impl Patcher {
    /// Create a patcher for `layout`
    pub fn new(layout: SheetLayout) -> Self {
        Self { layout }
    }

    /// The layout this patcher writes
    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    /// Read the extract from `upload`, patch a copy of `template` and write it to `dest`.
    ///
    /// `dest` is only created once the whole patch has succeeded.
    pub fn patch_file<U, T, D>(
        &self,
        upload: U,
        template: T,
        dest: D,
        date: DateKey,
    ) -> XlsxResult<PatchReport>
    where
        U: AsRef<Path>,
        T: AsRef<Path>,
        D: AsRef<Path>,
    {
        let extract = Extract::read_file(upload, &self.layout.source_range)?;
        let mut package = Package::open(template)?;
        let report = self.apply(&mut package, &extract, date)?;
        package.write_file(dest)?;
        Ok(report)
    }

    /// Apply the extract and date header to an opened template
    pub fn apply(
        &self,
        package: &mut Package,
        extract: &Extract,
        date: DateKey,
    ) -> XlsxResult<PatchReport> {
        let sst_path = package.ensure_shared_strings()?;
        let mut table = SharedStrings::parse(package.required_part(&sst_path)?)?;
        let sheet_path = package.resolve_sheet_by_name(&self.layout.target_sheet)?;

        let mut edits = BTreeMap::new();
        for i in 0..extract.row_count() {
            for c in 0..extract.col_count() {
                let address = self.layout.target_cell(i as u32, c as u16);
                edits.insert(address, CellContent::encode(extract.get(i, c), &mut table));
            }
        }
        edits.insert(
            self.layout.date_cell,
            CellContent::Number(date.serial().to_string()),
        );

        let patch = sheet::patch_cells(package.required_part(&sheet_path)?, &edits)?;
        package.set_part(&sheet_path, patch.xml);

        if patch.formulas_cleared > 0 {
            package.remove_calc_chain()?;
        }
        package.set_part(&sst_path, table.to_xml()?);
        package.request_full_recalc()?;

        log::debug!(
            "patched {sheet_path}: {} cells, {} new shared strings",
            patch.cells_written,
            table.appended()
        );

        Ok(PatchReport {
            sheet_path,
            cells_written: patch.cells_written,
            strings_added: table.appended(),
            shared_strings: table.len(),
            formulas_cleared: patch.formulas_cleared,
            formulas_detached: patch.formulas_detached,
        })
    }
}
