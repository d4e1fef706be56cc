//! Streaming worksheet reader and cell patcher

use std::collections::{BTreeMap, VecDeque};

use ahash::AHashMap;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use lcr_core::CellAddress;

use crate::cell::{CellContent, RawCell};
use crate::error::{XlsxError, XlsxResult};
use crate::formula::shift_references;

/// Read every `<c>` of a worksheet part, in document order.
///
/// Cells without an `r` attribute take the position after the previous cell
/// of their row, as spreadsheet applications do.
pub fn read_cells(xml: &[u8]) -> XlsxResult<Vec<(CellAddress, RawCell)>> {
    #[derive(Clone, Copy)]
    enum Target {
        Value,
        Formula,
        Inline,
    }

    let mut reader = Reader::from_reader(xml);
    let mut cells = Vec::new();

    let mut row = 0u32;
    let mut next_col = 0u16;
    let mut current: Option<(CellAddress, RawCell)> = None;
    let mut target: Option<Target> = None;
    let mut in_inline = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row = row_number(&e, row)?;
                    next_col = 0;
                }
                b"c" => {
                    let (address, raw) = open_cell(&e, row, next_col)?;
                    next_col = address.col.saturating_add(1);
                    current = Some((address, raw));
                }
                b"v" if current.is_some() => target = Some(Target::Value),
                b"f" if current.is_some() => target = Some(Target::Formula),
                b"is" if current.is_some() => in_inline = true,
                b"rPh" => in_phonetic = true,
                b"t" if in_inline && !in_phonetic => {
                    if let Some((_, cell)) = current.as_mut() {
                        cell.inline_text.get_or_insert_with(String::new);
                    }
                    target = Some(Target::Inline);
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => {
                    row = row_number(&e, row)?;
                    next_col = 0;
                }
                b"c" => {
                    let (address, raw) = open_cell(&e, row, next_col)?;
                    next_col = address.col.saturating_add(1);
                    cells.push((address, raw));
                }
                b"f" => {
                    if let Some((_, cell)) = current.as_mut() {
                        cell.formula.get_or_insert_with(String::new);
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                if let (Some(target), Some((_, cell))) = (target, current.as_mut()) {
                    let text = t.unescape()?;
                    let slot = match target {
                        Target::Value => &mut cell.value,
                        Target::Formula => &mut cell.formula,
                        Target::Inline => &mut cell.inline_text,
                    };
                    slot.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"c" => {
                    if let Some(cell) = current.take() {
                        cells.push(cell);
                    }
                    target = None;
                    in_inline = false;
                }
                b"v" | b"f" | b"t" => target = None,
                b"is" => in_inline = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(cells)
}

/// Result of [`patch_cells`]
#[derive(Debug, Clone)]
pub struct SheetPatch {
    /// The rewritten worksheet part
    pub xml: Vec<u8>,
    /// Cells written or cleared
    pub cells_written: usize,
    /// Overwritten cells that held a formula
    pub formulas_cleared: usize,
    /// Kept cells whose shared formula lost its master, rewritten as plain formulas
    pub formulas_detached: usize,
}

/// Rewrite a worksheet part with `edits` applied.
///
/// Existing cells are replaced in place, keeping their style. Missing rows
/// and cells are inserted in order. A [`CellContent::Blank`] edit for a cell
/// that does not exist is a no-op. When an edit overwrites the master cell of
/// a shared formula, the group's remaining cells get the formula written out
/// in full. Everything else is copied through unchanged.
pub fn patch_cells(
    xml: &[u8],
    edits: &BTreeMap<CellAddress, CellContent>,
) -> XlsxResult<SheetPatch> {
    #[derive(Clone, Copy)]
    enum State {
        Outside,
        SheetData,
        Row,
        KeptCell { address: CellAddress },
        DetachedFormula { address: CellAddress },
        ReplacedCell { had_formula: bool },
    }

    let orphaned = orphaned_shared_formulas(xml, edits)?;

    let mut grouped: BTreeMap<u32, RowEdits<'_>> = BTreeMap::new();
    for (address, content) in edits {
        grouped
            .entry(address.row_number())
            .or_default()
            .push_back((*address, content));
    }

    let mut patch = Patch {
        writer: Writer::new(Vec::with_capacity(xml.len() + edits.len() * 32)),
        rows: grouped.into_iter().collect(),
        cells_written: 0,
        formulas_cleared: 0,
        formulas_detached: 0,
    };

    let mut reader = Reader::from_reader(xml);
    let mut state = State::Outside;
    let mut saw_sheet_data = false;
    let mut row = 0u32;
    let mut next_col = 0u16;
    let mut row_edits: RowEdits<'_> = VecDeque::new();

    loop {
        let event = reader.read_event()?;
        if matches!(event, Event::Eof) {
            if !matches!(state, State::Outside) {
                return Err(XlsxError::InvalidFormat(
                    "worksheet ended inside <sheetData>".into(),
                ));
            }
            break;
        }

        match state {
            State::Outside => match event {
                Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                    saw_sheet_data = true;
                    state = State::SheetData;
                    patch.write(Event::Start(e))?;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                    saw_sheet_data = true;
                    if patch.has_pending_content() {
                        let name = element_name(&e);
                        patch.write(Event::Start(e))?;
                        patch.flush_rows_before(None)?;
                        patch.write(Event::End(BytesEnd::new(name)))?;
                    } else {
                        patch.write(Event::Empty(e))?;
                    }
                }
                other => patch.write(other)?,
            },
            State::SheetData => match event {
                Event::Start(e) if e.local_name().as_ref() == b"row" => {
                    row = row_number(&e, row)?;
                    next_col = 0;
                    patch.flush_rows_before(Some(row))?;
                    row_edits = patch.take_row(row);
                    if row_edits.is_empty() {
                        patch.write(Event::Start(e))?;
                    } else {
                        patch.write(Event::Start(without_spans(&e)))?;
                    }
                    state = State::Row;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                    row = row_number(&e, row)?;
                    patch.flush_rows_before(Some(row))?;
                    let edits = patch.take_row(row);
                    if edits.iter().any(|(_, content)| !is_blank(content)) {
                        let name = element_name(&e);
                        patch.write(Event::Start(without_spans(&e)))?;
                        patch.write_new_cells(edits)?;
                        patch.write(Event::End(BytesEnd::new(name)))?;
                    } else {
                        patch.write(Event::Empty(e))?;
                    }
                }
                Event::End(e) => {
                    patch.flush_rows_before(None)?;
                    patch.write(Event::End(e))?;
                    state = State::Outside;
                }
                other => patch.write(other)?,
            },
            State::Row => match event {
                Event::Start(e) if e.local_name().as_ref() == b"c" => {
                    let address = cell_address(&e, row, next_col)?;
                    next_col = address.col.saturating_add(1);
                    let before = take_before(&mut row_edits, address.col);
                    patch.write_new_cells(before)?;

                    if let Some(content) = take_at(&mut row_edits, address.col) {
                        patch.write_cell(&address, content, Some(&e))?;
                        state = State::ReplacedCell { had_formula: false };
                    } else {
                        patch.write(Event::Start(e))?;
                        state = State::KeptCell { address };
                    }
                }
                Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                    let address = cell_address(&e, row, next_col)?;
                    next_col = address.col.saturating_add(1);
                    let before = take_before(&mut row_edits, address.col);
                    patch.write_new_cells(before)?;

                    match take_at(&mut row_edits, address.col) {
                        Some(content) => patch.write_cell(&address, content, Some(&e))?,
                        None => patch.write(Event::Empty(e))?,
                    }
                }
                Event::End(e) if e.local_name().as_ref() == b"row" => {
                    let rest = std::mem::take(&mut row_edits);
                    patch.write_new_cells(rest)?;
                    patch.write(Event::End(e))?;
                    state = State::SheetData;
                }
                other => patch.write(other)?,
            },
            State::KeptCell { address } => match event {
                Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                    match orphaned_master(&e, &orphaned)? {
                        Some(master) => patch.write_detached_formula(&address, master)?,
                        None => patch.write(Event::Empty(e))?,
                    }
                }
                Event::Start(e) if e.local_name().as_ref() == b"f" => {
                    match orphaned_master(&e, &orphaned)? {
                        Some(master) => {
                            patch.write_detached_formula(&address, master)?;
                            state = State::DetachedFormula { address };
                        }
                        None => patch.write(Event::Start(e))?,
                    }
                }
                Event::End(e) if e.local_name().as_ref() == b"c" => {
                    patch.write(Event::End(e))?;
                    state = State::Row;
                }
                other => patch.write(other)?,
            },
            // The old <f> of a detached dependent is dropped.
            State::DetachedFormula { address } => {
                if matches!(&event, Event::End(e) if e.local_name().as_ref() == b"f") {
                    state = State::KeptCell { address };
                }
            }
            // Children of a replaced cell are dropped.
            State::ReplacedCell { had_formula } => match event {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                    state = State::ReplacedCell { had_formula: true };
                }
                Event::End(e) if e.local_name().as_ref() == b"c" => {
                    if had_formula {
                        patch.formulas_cleared += 1;
                    }
                    state = State::Row;
                }
                _ => {}
            },
        }
    }

    if !saw_sheet_data && patch.has_pending_content() {
        return Err(XlsxError::InvalidFormat(
            "worksheet has no <sheetData>".into(),
        ));
    }

    Ok(SheetPatch {
        xml: patch.writer.into_inner(),
        cells_written: patch.cells_written,
        formulas_cleared: patch.formulas_cleared,
        formulas_detached: patch.formulas_detached,
    })
}

/// The defining cell of a shared formula group
#[derive(Debug, Clone)]
struct SharedMaster {
    address: CellAddress,
    formula: String,
}

/// Shared formula groups whose master cell is overwritten by `edits`, by `si`
fn orphaned_shared_formulas(
    xml: &[u8],
    edits: &BTreeMap<CellAddress, CellContent>,
) -> XlsxResult<AHashMap<String, SharedMaster>> {
    let mut masters = AHashMap::new();
    let mut reader = Reader::from_reader(xml);
    let mut row = 0u32;
    let mut next_col = 0u16;
    let mut edited: Option<CellAddress> = None;
    let mut group: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row = row_number(&e, row)?;
                    next_col = 0;
                }
                b"c" => {
                    let address = cell_address(&e, row, next_col)?;
                    next_col = address.col.saturating_add(1);
                    edited = edits.contains_key(&address).then_some(address);
                }
                b"f" if edited.is_some() => {
                    group = match shared_group(&e)? {
                        Some((si, true)) => Some(si),
                        _ => None,
                    };
                    text.clear();
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => {
                    row = row_number(&e, row)?;
                    next_col = 0;
                }
                b"c" => {
                    let address = cell_address(&e, row, next_col)?;
                    next_col = address.col.saturating_add(1);
                }
                _ => {}
            },
            Event::Text(t) if group.is_some() => text.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"f" => {
                    if let (Some(si), Some(address)) = (group.take(), edited) {
                        let formula = std::mem::take(&mut text);
                        masters.insert(si, SharedMaster { address, formula });
                    }
                }
                b"c" => edited = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(masters)
}

/// `(si, is_master)` of a `<f t="shared">`; `None` for any other formula
fn shared_group(e: &BytesStart<'_>) -> XlsxResult<Option<(String, bool)>> {
    let mut shared = false;
    let mut si = None;
    let mut has_ref = false;
    for a in e.attributes().flatten() {
        match a.key.as_ref() {
            b"t" => shared = a.value.as_ref() == b"shared",
            b"si" => si = Some(a.unescape_value()?.trim().to_string()),
            b"ref" => has_ref = true,
            _ => {}
        }
    }
    Ok(si.filter(|_| shared).map(|si| (si, has_ref)))
}

/// The overwritten master a dependent `<f>` points at, if any
fn orphaned_master<'m>(
    e: &BytesStart<'_>,
    orphaned: &'m AHashMap<String, SharedMaster>,
) -> XlsxResult<Option<&'m SharedMaster>> {
    if orphaned.is_empty() {
        return Ok(None);
    }
    Ok(match shared_group(e)? {
        Some((si, false)) => orphaned.get(&si),
        _ => None,
    })
}

type RowEdits<'a> = VecDeque<(CellAddress, &'a CellContent)>;

struct Patch<'a> {
    writer: Writer<Vec<u8>>,
    rows: VecDeque<(u32, RowEdits<'a>)>,
    cells_written: usize,
    formulas_cleared: usize,
    formulas_detached: usize,
}

impl<'a> Patch<'a> {
    fn write(&mut self, event: Event<'_>) -> XlsxResult<()> {
        self.writer.write_event(event)?;
        Ok(())
    }

    fn write_cell(
        &mut self,
        address: &CellAddress,
        content: &CellContent,
        existing: Option<&BytesStart<'_>>,
    ) -> XlsxResult<()> {
        let fragment = content.render(address, existing)?;
        self.writer.get_mut().extend_from_slice(&fragment);
        self.cells_written += 1;
        Ok(())
    }

    /// `<f>` for the cell at `address` holding `master`'s formula as it reads there
    fn write_detached_formula(&mut self, address: &CellAddress, master: &SharedMaster) -> XlsxResult<()> {
        let rows = i64::from(address.row) - i64::from(master.address.row);
        let cols = i64::from(address.col) - i64::from(master.address.col);
        let formula = shift_references(&master.formula, rows, cols);

        self.write(Event::Start(BytesStart::new("f")))?;
        self.write(Event::Text(BytesText::new(&formula)))?;
        self.write(Event::End(BytesEnd::new("f")))?;
        self.formulas_detached += 1;
        Ok(())
    }

    /// Insert cells that have no element yet; blanks need nothing
    fn write_new_cells<I>(&mut self, edits: I) -> XlsxResult<()>
    where
        I: IntoIterator<Item = (CellAddress, &'a CellContent)>,
    {
        for (address, content) in edits {
            if !is_blank(content) {
                self.write_cell(&address, content, None)?;
            }
        }
        Ok(())
    }

    /// Edits for row `r`, if any are still pending
    fn take_row(&mut self, r: u32) -> RowEdits<'a> {
        match self.rows.front() {
            Some((next, _)) if *next == r => self.rows.pop_front().map(|(_, e)| e).unwrap_or_default(),
            _ => VecDeque::new(),
        }
    }

    /// Insert new `<row>` elements for pending rows numbered below `limit`
    fn flush_rows_before(&mut self, limit: Option<u32>) -> XlsxResult<()> {
        while let Some((r, _)) = self.rows.front() {
            if limit.is_some_and(|limit| *r >= limit) {
                break;
            }
            let Some((r, edits)) = self.rows.pop_front() else {
                break;
            };
            if edits.iter().all(|(_, content)| is_blank(content)) {
                continue;
            }

            let number = r.to_string();
            self.write(Event::Start(
                BytesStart::new("row").with_attributes([("r", number.as_str())]),
            ))?;
            self.write_new_cells(edits)?;
            self.write(Event::End(BytesEnd::new("row")))?;
        }
        Ok(())
    }

    fn has_pending_content(&self) -> bool {
        self.rows
            .iter()
            .any(|(_, edits)| edits.iter().any(|(_, content)| !is_blank(content)))
    }
}

fn is_blank(content: &CellContent) -> bool {
    matches!(content, CellContent::Blank)
}

/// Pending edits left of column `col`
fn take_before<'a>(edits: &mut RowEdits<'a>, col: u16) -> Vec<(CellAddress, &'a CellContent)> {
    let n = edits.iter().take_while(|(a, _)| a.col < col).count();
    edits.drain(..n).collect()
}

/// The pending edit for column `col`, if it is next
fn take_at<'a>(edits: &mut RowEdits<'a>, col: u16) -> Option<&'a CellContent> {
    match edits.front() {
        Some((a, _)) if a.col == col => edits.pop_front().map(|(_, content)| content),
        _ => None,
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// `<row>` without its `spans` hint, which an edit may invalidate
fn without_spans(e: &BytesStart<'_>) -> BytesStart<'static> {
    let mut start = BytesStart::new(element_name(e));
    for a in e.attributes().flatten() {
        if a.key.as_ref() != b"spans" {
            start.push_attribute((a.key.as_ref(), a.value.as_ref()));
        }
    }
    start
}

/// 1-based row number of a `<row>`, or the one after `previous`
fn row_number(e: &BytesStart<'_>, previous: u32) -> XlsxResult<u32> {
    for a in e.attributes().flatten() {
        if a.key.as_ref() == b"r" {
            let value = a.unescape_value()?;
            return value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|r| *r >= 1)
                .ok_or_else(|| XlsxError::InvalidFormat(format!("invalid row number '{value}'")));
        }
    }
    Ok(previous + 1)
}

fn cell_address(e: &BytesStart<'_>, row: u32, next_col: u16) -> XlsxResult<CellAddress> {
    for a in e.attributes().flatten() {
        if a.key.as_ref() == b"r" {
            let value = a.unescape_value()?;
            return Ok(CellAddress::parse(&value)?);
        }
    }
    Ok(CellAddress::new(row.saturating_sub(1), next_col))
}

fn open_cell(e: &BytesStart<'_>, row: u32, next_col: u16) -> XlsxResult<(CellAddress, RawCell)> {
    let address = cell_address(e, row, next_col)?;
    let mut raw = RawCell::default();
    for a in e.attributes().flatten() {
        match a.key.as_ref() {
            b"r" => raw.reference = Some(a.unescape_value()?.to_string()),
            b"t" => raw.cell_type = Some(a.unescape_value()?.to_string()),
            _ => {}
        }
    }
    Ok((address, raw))
}
