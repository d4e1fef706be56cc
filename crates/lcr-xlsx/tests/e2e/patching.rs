//! Patching an extract into the template

use lcr_core::{DateKey, SheetLayout};
use lcr_xlsx::{Extract, Package, Patcher, XlsxError};
use pretty_assertions::assert_eq;

use crate::common::*;

fn date() -> DateKey {
    DateKey::parse("2026-02-04").unwrap()
}

fn template() -> WorkbookBuilder {
    WorkbookBuilder::new()
        .sheet("Cover", r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#)
        .sheet(
            "BS_RE33",
            concat!(
                r#"<row r="1" spans="1:14"><c r="A1" t="s"><v>0</v></c></row>"#,
                r#"<row r="4" spans="13:14"><c r="M4" t="s"><v>1</v></c><c r="N4" s="1"><v>0</v></c></row>"#,
                r#"<row r="6"><c r="A6"><f>SUM(A7:A705)</f><v>0</v></c></row>"#,
                r#"<row r="7" spans="1:12"><c r="A7" s="2" t="s"><v>2</v></c><c r="B7"><f>A7*2</f><v>4</v></c><c r="L7"><v>99</v></c></row>"#,
                r#"<row r="800"><c r="A800"><v>5</v></c></row>"#,
            ),
        )
        .shared_strings(&["LCR Report", "Date", "old"])
        .calc_chain()
}

fn upload() -> WorkbookBuilder {
    WorkbookBuilder::new()
        .sheet(
            "Data",
            concat!(
                r#"<row r="1"><c r="A1" t="inlineStr"><is><t>Account</t></is></c></row>"#,
                r#"<row r="2"><c r="A2" t="s"><v>0</v></c><c r="B2" t="inlineStr"><is><t xml:space="preserve">  12.5 </t></is></c><c r="C2"><v>-3</v></c><c r="D2" t="inlineStr"><is><t xml:space="preserve"> Cash </t></is></c></row>"#,
                r#"<row r="3"><c r="A3" t="inlineStr"><is><t>Loans</t></is></c><c r="B3" t="inlineStr"><is><t>007</t></is></c><c r="K3" t="inlineStr"><is><t>1e5</t></is></c><c r="L3"><v>12</v></c></row>"#,
                r#"<row r="701"><c r="A701" t="inlineStr"><is><t>beyond</t></is></c></row>"#,
            ),
        )
        .sheet("Other", r#"<row r="2"><c r="A2"><v>1</v></c></row>"#)
        .shared_strings(&["Cash"])
}

#[test]
fn test_patch_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let upload_path = dir.path().join("upload.xlsx");
    let template_path = dir.path().join("template.xlsx");
    let dest = dir.path().join("out.xlsx");
    upload().write_to(&upload_path);
    template().write_to(&template_path);

    let report = Patcher::default()
        .patch_file(&upload_path, &template_path, &dest, date())
        .unwrap();

    assert_eq!(report.sheet_path, "xl/worksheets/sheet2.xml");
    assert_eq!(report.cells_written, 8);
    assert_eq!(report.strings_added, 3);
    assert_eq!(report.shared_strings, 6);
    assert_eq!(report.formulas_cleared, 1);

    let cells = read_sheet(&dest, "BS_RE33");
    let text = |r: &str| cells.get(r).map(|c| c.text.as_str());
    let kind = |r: &str| cells.get(r).and_then(|c| c.cell_type.as_deref());

    // Strings
    assert_eq!(text("A7"), Some("Cash"));
    assert_eq!(kind("A7"), Some("s"));
    assert_eq!(text("D7"), Some("Cash"));
    assert_eq!(text("A8"), Some("Loans"));
    assert_eq!(text("K8"), Some("1e5"));
    assert_eq!(kind("K8"), Some("s"));

    // Numbers keep their literal
    assert_eq!(text("B7"), Some("12.5"));
    assert_eq!(kind("B7"), None);
    assert!(!cells["B7"].has_formula);
    assert_eq!(text("C7"), Some("-3"));
    assert_eq!(text("B8"), Some("007"));
    assert_eq!(kind("B8"), None);

    // Date header
    assert_eq!(cells["N4"].value.as_deref(), Some("46057"));
    assert_eq!(kind("N4"), None);

    // Outside the window
    assert_eq!(text("A1"), Some("LCR Report"));
    assert_eq!(text("M4"), Some("Date"));
    assert!(cells["A6"].has_formula);
    assert_eq!(text("L7"), Some("99"));
    assert_eq!(text("A800"), Some("5"));
    assert!(!cells.contains_key("L8"));
    assert!(!cells.contains_key("A706"));
    assert!(!cells.contains_key("E7"));
}

#[test]
fn test_patch_keeps_styles_and_drops_spans() {
    let mut package = Package::read(std::io::Cursor::new(template().build())).unwrap();
    let extract = Extract::from_rows(vec![vec!["x".into()]]);
    Patcher::default().apply(&mut package, &extract, date()).unwrap();

    let xml = String::from_utf8(package.part("xl/worksheets/sheet2.xml").unwrap().to_vec()).unwrap();
    assert!(xml.contains(r#"<row r="7"><c r="A7" s="2" t="s"><v>3</v></c>"#), "{xml}");
    assert!(xml.contains(r#"<c r="N4" s="1"><v>46057</v></c>"#), "{xml}");
    assert!(xml.contains(r#"<row r="1" spans="1:14">"#), "{xml}");
}

#[test]
fn test_shared_string_dedup() {
    let mut package = Package::read(std::io::Cursor::new(template().build())).unwrap();
    let extract = Extract::from_rows(vec![
        vec!["Same".into(), "Same".into()],
        vec!["old".into(), "Same".into()],
    ]);

    let report = Patcher::default().apply(&mut package, &extract, date()).unwrap();
    assert_eq!(report.strings_added, 1);
    assert_eq!(report.shared_strings, 4);

    let table = package.shared_strings().unwrap();
    let same = table.position("Same").unwrap();
    assert_eq!(same, 3);
    assert_eq!(table.position("old"), Some(2));

    let sst = String::from_utf8(package.part("xl/sharedStrings.xml").unwrap().to_vec()).unwrap();
    assert_eq!(sst.matches("<t>Same</t>").count(), 1);
    assert!(sst.contains(r#"count="4" uniqueCount="4""#));

    let xml = String::from_utf8(package.part("xl/worksheets/sheet2.xml").unwrap().to_vec()).unwrap();
    assert!(xml.contains(r#"<c r="B7" t="s"><v>3</v></c>"#), "{xml}");
    assert!(xml.contains(r#"<c r="B8" t="s"><v>3</v></c>"#), "{xml}");
    assert!(xml.contains(r#"<c r="A8" t="s"><v>2</v></c>"#), "{xml}");
}

#[test]
fn test_untouched_parts_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let upload_path = dir.path().join("upload.xlsx");
    let template_path = dir.path().join("template.xlsx");
    let dest = dir.path().join("out.xlsx");
    upload().write_to(&upload_path);
    template().write_to(&template_path);

    Patcher::default()
        .patch_file(&upload_path, &template_path, &dest, date())
        .unwrap();

    let before = read_parts(&template_path);
    let after = read_parts(&dest);
    let changed = [
        "xl/worksheets/sheet2.xml",
        "xl/sharedStrings.xml",
        "xl/workbook.xml",
        "xl/_rels/workbook.xml.rels",
        "[Content_Types].xml",
        "xl/calcChain.xml",
    ];

    for (name, bytes) in &before {
        if changed.contains(&name.as_str()) {
            continue;
        }
        assert_eq!(after.get(name), Some(bytes), "{name} changed");
    }
    assert!(after.contains_key("xl/styles.xml"));
    assert!(after.contains_key("docProps/app.xml"));
}

#[test]
fn test_overwritten_formula_drops_calc_chain() {
    let dir = tempfile::tempdir().unwrap();
    let upload_path = dir.path().join("upload.xlsx");
    let template_path = dir.path().join("template.xlsx");
    let dest = dir.path().join("out.xlsx");
    upload().write_to(&upload_path);
    template().write_to(&template_path);

    Patcher::default()
        .patch_file(&upload_path, &template_path, &dest, date())
        .unwrap();

    let parts = read_parts(&dest);
    assert!(!parts.contains_key("xl/calcChain.xml"));
    assert!(!part_text(&dest, "xl/_rels/workbook.xml.rels").contains("calcChain"));
    assert!(!part_text(&dest, "[Content_Types].xml").contains("calcChain"));
    assert!(part_text(&dest, "xl/workbook.xml")
        .contains(r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#));
}

#[test]
fn test_calc_chain_kept_without_formula_overwrite() {
    let mut package = Package::read(std::io::Cursor::new(template().build())).unwrap();
    // One column only: B7 (the formula cell) stays untouched
    let extract = Extract::from_rows(vec![vec!["1".into()]]);
    let report = Patcher::default().apply(&mut package, &extract, date()).unwrap();

    assert_eq!(report.formulas_cleared, 0);
    assert!(package.contains("xl/calcChain.xml"));
}

#[test]
fn test_missing_shared_strings_are_synthesized() {
    let builder = WorkbookBuilder::new().sheet("BS_RE33", "");
    let mut package = Package::read(std::io::Cursor::new(builder.build())).unwrap();
    assert_eq!(package.shared_strings_path().unwrap(), None);

    let extract = Extract::from_rows(vec![vec!["Deposits".into(), "10".into()]]);
    let report = Patcher::default().apply(&mut package, &extract, date()).unwrap();
    assert_eq!(report.shared_strings, 1);

    assert_eq!(
        package.shared_strings_path().unwrap().as_deref(),
        Some("xl/sharedStrings.xml")
    );
    let rels = String::from_utf8(package.part("xl/_rels/workbook.xml.rels").unwrap().to_vec()).unwrap();
    assert!(rels.contains(r#"Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml""#), "{rels}");
    let types = String::from_utf8(package.part("[Content_Types].xml").unwrap().to_vec()).unwrap();
    assert!(types.contains(r#"<Override PartName="/xl/sharedStrings.xml""#), "{types}");

    let table = package.shared_strings().unwrap();
    assert_eq!(table.get(0), Some("Deposits"));

    let xml = String::from_utf8(package.part("xl/worksheets/sheet1.xml").unwrap().to_vec()).unwrap();
    assert!(xml.contains(r#"<row r="4"><c r="N4"><v>46057</v></c></row>"#), "{xml}");
    assert!(xml.contains(r#"<row r="7"><c r="A7" t="s"><v>0</v></c><c r="B7"><v>10</v></c></row>"#), "{xml}");
}

#[test]
fn test_repatch_same_cell_leaves_no_stale_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut template_path = dir.path().join("template.xlsx");
    template().write_to(&template_path);

    for (round, value) in ["5", "abc", ""].into_iter().enumerate() {
        let mut package = Package::open(&template_path).unwrap();
        let extract = Extract::from_rows(vec![vec![value.into(), String::new()]]);
        Patcher::default().apply(&mut package, &extract, date()).unwrap();

        let dest = dir.path().join(format!("round{round}.xlsx"));
        package.write_file(&dest).unwrap();

        let cells = read_sheet(&dest, "BS_RE33");
        let a7 = &cells["A7"];
        assert!(!a7.has_formula);
        assert!(!a7.has_inline);
        assert_eq!(a7.text, value);
        match value {
            "5" => {
                assert_eq!(a7.cell_type, None);
                assert_eq!(a7.value.as_deref(), Some("5"));
            }
            "abc" => assert_eq!(a7.cell_type.as_deref(), Some("s")),
            _ => {
                assert_eq!(a7.cell_type, None);
                assert_eq!(a7.value, None);
            }
        }

        // B7 had a formula in the original template and was cleared in round 0
        let b7 = &cells["B7"];
        assert!(!b7.has_formula);
        assert_eq!(b7.value, None);

        template_path = dest;
    }
}

#[test]
fn test_missing_target_sheet_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let upload_path = dir.path().join("upload.xlsx");
    let template_path = dir.path().join("template.xlsx");
    let dest = dir.path().join("out.xlsx");
    upload().write_to(&upload_path);
    template().write_to(&template_path);

    let layout = SheetLayout {
        target_sheet: "BS_RE34".into(),
        ..SheetLayout::default()
    };
    let err = Patcher::new(layout)
        .patch_file(&upload_path, &template_path, &dest, date())
        .unwrap_err();

    assert!(matches!(err, XlsxError::SheetNotFound(ref name) if name == "BS_RE34"));
    assert!(!dest.exists());
}

#[test]
fn test_extract_reads_first_sheet_window() {
    let dir = tempfile::tempdir().unwrap();
    let upload_path = dir.path().join("upload.xlsx");
    upload().write_to(&upload_path);

    let layout = SheetLayout::default();
    let extract = Extract::read_file(&upload_path, &layout.source_range).unwrap();

    assert_eq!(extract.row_count(), 699);
    assert_eq!(extract.col_count(), 11);
    assert_eq!(extract.get(0, 0), "Cash");
    assert_eq!(extract.get(0, 1), "12.5");
    assert_eq!(extract.get(0, 3), "Cash");
    assert_eq!(extract.get(1, 10), "1e5");
    assert_eq!(extract.get(698, 0), "");
    assert!(extract.rows().all(|row| row.len() == 11));
}

#[test]
fn test_overwritten_shared_formula_master() {
    let template = WorkbookBuilder::new().sheet(
        "BS_RE33",
        concat!(
            r#"<row r="7"><c r="C7"><f t="shared" ref="C7:C9" si="0">A7+B7</f><v>3</v></c><c r="M7"><f t="shared" ref="M7:M8" si="1">C7*2</f><v>6</v></c></row>"#,
            r#"<row r="8"><c r="C8"><f t="shared" si="0"/><v>0</v></c><c r="M8"><f t="shared" si="1"/><v>0</v></c></row>"#,
            r#"<row r="9"><c r="C9"><f t="shared" si="0"/><v>0</v></c></row>"#,
        ),
    );
    let mut package = Package::read(std::io::Cursor::new(template.build())).unwrap();
    let extract = Extract::from_rows(vec![vec!["x".into(), "1".into(), "2".into()]]);

    let report = Patcher::default().apply(&mut package, &extract, date()).unwrap();
    assert_eq!(report.formulas_cleared, 1);
    assert_eq!(report.formulas_detached, 2);

    let xml = String::from_utf8(package.part("xl/worksheets/sheet1.xml").unwrap().to_vec()).unwrap();
    assert!(xml.contains(r#"<c r="C7"><v>2</v></c>"#), "{xml}");
    assert!(xml.contains(r#"<c r="C8"><f>A8+B8</f><v>0</v></c>"#), "{xml}");
    assert!(xml.contains(r#"<c r="C9"><f>A9+B9</f><v>0</v></c>"#), "{xml}");
    // A group whose master survives is left as it was
    assert!(xml.contains(r#"<c r="M7"><f t="shared" ref="M7:M8" si="1">C7*2</f><v>6</v></c>"#), "{xml}");
    assert!(xml.contains(r#"<c r="M8"><f t="shared" si="1"/><v>0</v></c>"#), "{xml}");
    assert!(!xml.contains(r#"si="0""#), "{xml}");
}
