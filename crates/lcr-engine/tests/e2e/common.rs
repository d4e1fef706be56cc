//! Isolated data directories and in-memory fixture workbooks.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use lcr_engine::{Automation, Engine, EngineConfig};
use lcr_excel_com::{AutomationJob, BridgeError};
use lcr_xlsx::{sheet, Package};

pub const DATE: &str = "2026-02-04";

/// Zip a workbook whose sheets hold the given `<sheetData>` rows
pub fn workbook(sheets: &[(&str, &str)]) -> Vec<u8> {
    let mut content_types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    let mut book = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut parts = Vec::new();

    for (i, (name, rows)) in sheets.iter().enumerate() {
        let n = i + 1;
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
        book.push_str(&format!(r#"<sheet name="{name}" sheetId="{n}" r:id="rId{n}"/>"#));
        parts.push((
            format!("xl/worksheets/sheet{n}.xml"),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{rows}</sheetData></worksheet>"#
            ),
        ));
    }
    content_types.push_str("</Types>");
    rels.push_str("</Relationships>");
    book.push_str(r#"</sheets><calcPr calcId="191029"/></workbook>"#);

    let mut all = vec![
        ("[Content_Types].xml".to_string(), content_types),
        (
            "_rels/.rels".to_string(),
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
                .to_string(),
        ),
        ("xl/workbook.xml".to_string(), book),
        ("xl/_rels/workbook.xml.rels".to_string(), rels),
    ];
    all.append(&mut parts);

    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        for (name, content) in all {
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

/// A template with a header block and a stale data row
pub fn template() -> Vec<u8> {
    workbook(&[
        ("Summary", r#"<row r="1"><c r="A1"><f>BS_RE33!N4</f></c></row>"#),
        (
            "BS_RE33",
            r#"<row r="4"><c r="M4" t="inlineStr"><is><t>Date</t></is></c><c r="N4"><v>1</v></c></row><row r="7"><c r="A7" t="inlineStr"><is><t>stale</t></is></c><c r="B7"><v>99</v></c></row>"#,
        ),
    ])
}

/// A daily extract: header row, then two data rows
pub fn extract() -> Vec<u8> {
    workbook(&[(
        "Export",
        r#"<row r="1"><c r="A1" t="inlineStr"><is><t>Item</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t> HQLA Level 1 </t></is></c><c r="B2"><v>1250.5</v></c></row><row r="3"><c r="A3" t="inlineStr"><is><t>Outflows</t></is></c><c r="B3"><v>-42</v></c></row>"#,
    )])
}

/// An engine over a private data directory and download area
pub struct Harness {
    pub root: tempfile::TempDir,
    pub config: EngineConfig,
}

impl Harness {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::new(root.path().join("data"));
        config.download_dir = Some(root.path().join("Downloads"));
        Self { root, config }
    }

    /// Place the fixture template at `data/base_template.xlsx`
    pub fn with_template(self) -> Self {
        let path = self.data().join("base_template.xlsx");
        std::fs::create_dir_all(self.data()).unwrap();
        std::fs::write(path, template()).unwrap();
        self
    }

    pub fn data(&self) -> PathBuf {
        self.config.data_dir.clone()
    }

    pub fn history(&self, date: &str) -> PathBuf {
        self.data().join("history").join(format!("{date}.xlsx"))
    }

    pub fn engine(&self) -> Engine {
        Engine::new(&self.config).unwrap()
    }

    pub fn engine_with(&self, automation: impl Automation + 'static) -> Engine {
        Engine::with_automation(&self.config, Box::new(automation)).unwrap()
    }
}

/// Sorted names of the entries in `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Text of every cell in sheet `name`, keyed by A1 reference
pub fn sheet_text(path: &Path, name: &str) -> Vec<(String, String)> {
    let package = Package::open(path).unwrap();
    let sheet_path = package.resolve_sheet_by_name(name).unwrap();
    let table = package.shared_strings().unwrap();
    sheet::read_cells(package.part(&sheet_path).unwrap())
        .unwrap()
        .into_iter()
        .map(|(address, raw)| (address.to_a1_string(), raw.text(&table)))
        .collect()
}

/// Automation double that records jobs and writes fixed output
#[derive(Clone, Default)]
pub struct RecordingAutomation {
    pub jobs: Arc<Mutex<Vec<AutomationJob>>>,
    pub output: Vec<u8>,
}

impl Automation for RecordingAutomation {
    fn run(&self, job: &AutomationJob) -> Result<(), BridgeError> {
        std::fs::write(&job.output_path, &self.output).map_err(BridgeError::ScriptWrite)?;
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

/// Automation double that writes partial output, then fails
pub struct FailingAutomation;

impl Automation for FailingAutomation {
    fn run(&self, job: &AutomationJob) -> Result<(), BridgeError> {
        std::fs::write(&job.output_path, b"partial").map_err(BridgeError::ScriptWrite)?;
        Err(BridgeError::ProcessFailed {
            code: Some(1),
            diagnostics: "Exception: workbook is locked".to_string(),
        })
    }
}
