//! In-memory OOXML package: part name to bytes, with sheet resolution
//! through the workbook's relationship map.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{XlsxError, XlsxResult};
use crate::shared_strings::SharedStrings;

const CONTENT_TYPES: &str = "[Content_Types].xml";
const ROOT_RELS: &str = "_rels/.rels";
const DEFAULT_WORKBOOK: &str = "xl/workbook.xml";

const REL_OFFICE_DOCUMENT: &str = "/officeDocument";
const REL_WORKSHEET: &str = "/worksheet";
const REL_SHARED_STRINGS: &str = "/sharedStrings";
const REL_CALC_CHAIN: &str = "/calcChain";

const SHARED_STRINGS_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
const SHARED_STRINGS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";

/// `workbook.xml` children that must follow `<calcPr>`
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// A sheet declared in `workbook.xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    /// Display name
    pub name: String,
    /// Relationship id (`r:id`)
    pub rel_id: String,
    /// Part path the relationship points at, if the relationship exists
    pub path: Option<String>,
}

/// One `<Relationship>` of a `.rels` part
#[derive(Debug, Clone)]
struct Relationship {
    id: String,
    rel_type: String,
    target: String,
}

/// An opened spreadsheet package.
///
/// Parts keep their archive order so a re-pack is stable; parts nobody
/// modifies are written back exactly as they were read.
#[derive(Debug, Clone, Default)]
pub struct Package {
    order: Vec<String>,
    parts: HashMap<String, Vec<u8>>,
}

impl Package {
    /// Read a package from a file path
    pub fn open<P: AsRef<Path>>(path: P) -> XlsxResult<Self> {
        let file = File::open(path)?;
        Self::read(file)
    }

    /// Read a package from a reader
    pub fn read<R: Read + Seek>(reader: R) -> XlsxResult<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut package = Package::default();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)?;
            package.set_part(&name, bytes);
        }

        if !package.contains(CONTENT_TYPES) {
            return Err(XlsxError::InvalidFormat(
                "Missing [Content_Types].xml".into(),
            ));
        }

        log::debug!("opened package with {} parts", package.order.len());
        Ok(package)
    }

    /// Part names in archive order
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Whether a part exists
    pub fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    /// Raw bytes of a part
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    /// Raw bytes of a part that must exist
    pub fn required_part(&self, name: &str) -> XlsxResult<&[u8]> {
        self.part(name)
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))
    }

    /// Insert or replace a part. New parts are appended to the archive order.
    pub fn set_part(&mut self, name: &str, bytes: Vec<u8>) {
        if self.parts.insert(name.to_string(), bytes).is_none() {
            self.order.push(name.to_string());
        }
    }

    /// Remove a part, returning its bytes
    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        let removed = self.parts.remove(name);
        if removed.is_some() {
            self.order.retain(|n| n != name);
        }
        removed
    }

    /// Path of the workbook part, found through the package relationships
    pub fn workbook_path(&self) -> XlsxResult<String> {
        if let Some(rels) = self.part(ROOT_RELS) {
            for rel in parse_relationships(rels)? {
                if rel.rel_type.ends_with(REL_OFFICE_DOCUMENT) {
                    return Ok(resolve_target("", &rel.target));
                }
            }
        }
        Ok(DEFAULT_WORKBOOK.to_string())
    }

    /// All sheets declared in the workbook, in declaration order
    pub fn sheets(&self) -> XlsxResult<Vec<SheetEntry>> {
        let workbook_path = self.workbook_path()?;
        let workbook = self.required_part(&workbook_path)?;
        let rels = self.workbook_relationships(&workbook_path)?;

        let targets: HashMap<&str, String> = rels
            .iter()
            .filter(|rel| rel.rel_type.ends_with(REL_WORKSHEET))
            .map(|rel| (rel.id.as_str(), resolve_target(&workbook_path, &rel.target)))
            .collect();

        let mut reader = Reader::from_reader(workbook);
        reader.trim_text(true);

        let mut sheets = Vec::new();
        loop {
            match reader.read_event()? {
                Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"sheet" => {
                    let mut name = None;
                    let mut rel_id = None;

                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"name" {
                            name = attr.unescape_value().ok().map(|s| s.to_string());
                        } else if attr.key.local_name().as_ref() == b"id"
                            && attr.key.prefix().is_some()
                        {
                            rel_id = attr.unescape_value().ok().map(|s| s.to_string());
                        }
                    }

                    if let (Some(name), Some(rel_id)) = (name, rel_id) {
                        let path = targets.get(rel_id.as_str()).cloned();
                        sheets.push(SheetEntry { name, rel_id, path });
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(sheets)
    }

    /// Part path of the sheet named `name`
    pub fn resolve_sheet_by_name(&self, name: &str) -> XlsxResult<String> {
        let sheet = self
            .sheets()?
            .into_iter()
            .find(|sheet| sheet.name == name)
            .ok_or_else(|| XlsxError::SheetNotFound(name.to_string()))?;

        let path = sheet
            .path
            .ok_or_else(|| XlsxError::SheetNotFound(name.to_string()))?;
        log::debug!("sheet {name:?} resolved to {path}");
        Ok(path)
    }

    /// Part path of the sheet at 1-based position `index`
    pub fn resolve_sheet_by_index(&self, index: usize) -> XlsxResult<String> {
        let sheets = self.sheets()?;
        let count = sheets.len();
        if index == 0 || index > count {
            return Err(XlsxError::InvalidSheetIndex { index, count });
        }

        let sheet = &sheets[index - 1];
        sheet
            .path
            .clone()
            .ok_or_else(|| XlsxError::SheetNotFound(sheet.name.clone()))
    }

    /// Path of the shared-string part, if the workbook declares one that exists
    pub fn shared_strings_path(&self) -> XlsxResult<Option<String>> {
        let workbook_path = self.workbook_path()?;
        let path = self
            .workbook_relationships(&workbook_path)?
            .into_iter()
            .find(|rel| rel.rel_type.ends_with(REL_SHARED_STRINGS))
            .map(|rel| resolve_target(&workbook_path, &rel.target));
        Ok(path.filter(|p| self.contains(p)))
    }

    /// Parsed shared-string table, or an empty one when the package has none
    pub fn shared_strings(&self) -> XlsxResult<SharedStrings> {
        match self.shared_strings_path()? {
            Some(path) => SharedStrings::parse(self.required_part(&path)?),
            None => Ok(SharedStrings::new()),
        }
    }

    /// Make sure the package has a shared-string part and return its path.
    ///
    /// A synthesized part is also registered in the workbook relationships and
    /// in `[Content_Types].xml`.
    pub fn ensure_shared_strings(&mut self) -> XlsxResult<String> {
        let workbook_path = self.workbook_path()?;
        let rels_path = rels_path_for(&workbook_path);
        let rels = self.workbook_relationships(&workbook_path)?;

        let declared = rels
            .iter()
            .find(|rel| rel.rel_type.ends_with(REL_SHARED_STRINGS))
            .map(|rel| resolve_target(&workbook_path, &rel.target));

        if let Some(path) = &declared {
            if self.contains(path) {
                return Ok(path.clone());
            }
        }

        let path = match declared {
            Some(path) => path,
            None => {
                let id = next_relationship_id(&rels);
                let fragment = format!(
                    r#"<Relationship Id="{id}" Type="{SHARED_STRINGS_REL_TYPE}" Target="sharedStrings.xml"/>"#
                );
                let updated = insert_before_end(self.required_part(&rels_path)?, &fragment)?;
                self.set_part(&rels_path, updated);
                resolve_target(&workbook_path, "sharedStrings.xml")
            }
        };

        let part_name = format!("/{path}");
        let has_override = self
            .content_type_overrides()?
            .iter()
            .any(|name| *name == part_name);
        if !has_override {
            let fragment = format!(
                r#"<Override PartName="{part_name}" ContentType="{SHARED_STRINGS_CONTENT_TYPE}"/>"#
            );
            let updated = insert_before_end(self.required_part(CONTENT_TYPES)?, &fragment)?;
            self.set_part(CONTENT_TYPES, updated);
        }

        self.set_part(&path, SharedStrings::new().to_xml()?);
        log::debug!("synthesized empty shared-string table at {path}");
        Ok(path)
    }

    /// Drop the calculation chain so the application rebuilds it on load.
    ///
    /// Needed whenever formula cells are overwritten with plain values, since a
    /// chain entry pointing at a cell without a formula makes Excel repair the file.
    pub fn remove_calc_chain(&mut self) -> XlsxResult<bool> {
        let workbook_path = self.workbook_path()?;
        let rels_path = rels_path_for(&workbook_path);
        let Some(rel) = self
            .workbook_relationships(&workbook_path)?
            .into_iter()
            .find(|rel| rel.rel_type.ends_with(REL_CALC_CHAIN))
        else {
            return Ok(false);
        };

        let path = resolve_target(&workbook_path, &rel.target);
        let updated = drop_empty_elements(self.required_part(&rels_path)?, b"Relationship", |e| {
            attr(e, b"Id").as_deref() == Some(rel.id.as_str())
        })?;
        self.set_part(&rels_path, updated);

        let part_name = format!("/{path}");
        let updated = drop_empty_elements(self.required_part(CONTENT_TYPES)?, b"Override", |e| {
            attr(e, b"PartName").as_deref() == Some(part_name.as_str())
        })?;
        self.set_part(CONTENT_TYPES, updated);

        self.remove_part(&path);
        log::debug!("removed calculation chain {path}");
        Ok(true)
    }

    /// Ask the spreadsheet application to fully recalculate when the file is opened
    pub fn request_full_recalc(&mut self) -> XlsxResult<()> {
        let workbook_path = self.workbook_path()?;
        let updated = set_full_calc_on_load(self.required_part(&workbook_path)?)?;
        self.set_part(&workbook_path, updated);
        Ok(())
    }

    /// Re-pack every part into a new archive at `path`, replacing any existing file
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> XlsxResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Re-pack every part into a writer
    pub fn write<W: Write + Seek>(&self, writer: W) -> XlsxResult<()> {
        let mut zip = zip::ZipWriter::new(writer);

        for name in &self.order {
            let Some(bytes) = self.parts.get(name) else {
                continue;
            };
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        zip.finish()?;
        Ok(())
    }

    fn workbook_relationships(&self, workbook_path: &str) -> XlsxResult<Vec<Relationship>> {
        let rels_path = rels_path_for(workbook_path);
        parse_relationships(self.required_part(&rels_path)?)
    }

    fn content_type_overrides(&self) -> XlsxResult<Vec<String>> {
        let mut reader = Reader::from_reader(self.required_part(CONTENT_TYPES)?);
        reader.trim_text(true);

        let mut names = Vec::new();
        loop {
            match reader.read_event()? {
                Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Override" => {
                    if let Some(name) = attr(&e, b"PartName") {
                        names.push(name);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(names)
    }
}

/// Unescaped value of an unprefixed attribute
fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

fn parse_relationships(xml: &[u8]) -> XlsxResult<Vec<Relationship>> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);

    let mut rels = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(rel_type), Some(target)) =
                    (attr(&e, b"Id"), attr(&e, b"Type"), attr(&e, b"Target"))
                {
                    rels.push(Relationship {
                        id,
                        rel_type,
                        target,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

fn next_relationship_id(rels: &[Relationship]) -> String {
    let mut n = rels.len() + 1;
    while rels.iter().any(|rel| rel.id == format!("rId{n}")) {
        n += 1;
    }
    format!("rId{n}")
}

/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`
fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target relative to the part that owns the relationship
fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    segments.join("/")
}

/// Insert a raw fragment as the last child of the document's root element
fn insert_before_end(xml: &[u8], fragment: &str) -> XlsxResult<Vec<u8>> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + fragment.len()));
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if depth == 0 => {
                // `<Relationships/>` with no children
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e))?;
                writer.get_mut().extend_from_slice(fragment.as_bytes());
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    writer.get_mut().extend_from_slice(fragment.as_bytes());
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    Ok(writer.into_inner())
}

/// Remove every empty element named `name` for which `pred` holds
fn drop_empty_elements<F>(xml: &[u8], name: &[u8], pred: F) -> XlsxResult<Vec<u8>>
where
    F: Fn(&BytesStart<'_>) -> bool,
{
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    loop {
        match reader.read_event()? {
            Event::Empty(e) if e.local_name().as_ref() == name && pred(&e) => {}
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    Ok(writer.into_inner())
}

/// Set `fullCalcOnLoad="1"` on `<calcPr>`, creating the element in schema order if absent
fn set_full_calc_on_load(xml: &[u8]) -> XlsxResult<Vec<u8>> {
    fn calc_pr(existing: Option<&BytesStart<'_>>) -> BytesStart<'static> {
        let mut start = BytesStart::new("calcPr");
        if let Some(existing) = existing {
            for a in existing.attributes().flatten() {
                if a.key.as_ref() != b"fullCalcOnLoad" {
                    start.push_attribute((a.key.as_ref(), a.value.as_ref()));
                }
            }
        }
        start.push_attribute(("fullCalcOnLoad", "1"));
        start
    }

    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 32));
    let mut depth = 0usize;
    let mut done = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if depth == 1 && e.local_name().as_ref() == b"calcPr" => {
                done = true;
                depth += 1;
                writer.write_event(Event::Start(calc_pr(Some(&e))))?;
            }
            Event::Empty(e) if depth == 1 && e.local_name().as_ref() == b"calcPr" => {
                done = true;
                writer.write_event(Event::Empty(calc_pr(Some(&e))))?;
            }
            Event::Start(e) => {
                if depth == 1 && !done && AFTER_CALC_PR.contains(&e.local_name().as_ref()) {
                    done = true;
                    writer.write_event(Event::Empty(calc_pr(None)))?;
                }
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) => {
                if depth == 1 && !done && AFTER_CALC_PR.contains(&e.local_name().as_ref()) {
                    done = true;
                    writer.write_event(Event::Empty(calc_pr(None)))?;
                }
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && !done {
                    done = true;
                    writer.write_event(Event::Empty(calc_pr(None)))?;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    Ok(writer.into_inner())
}
