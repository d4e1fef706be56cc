//! Package access: sheet resolution, re-packing, corrupt input

use std::io::Cursor;

use lcr_xlsx::{Package, XlsxError};
use pretty_assertions::assert_eq;

use crate::common::*;

fn two_sheet_workbook() -> WorkbookBuilder {
    WorkbookBuilder::new()
        .sheet("Summary", r#"<row r="1"><c r="A1"><v>1</v></c></row>"#)
        .sheet("BS_RE33", "")
        .shared_strings(&["x"])
}

#[test]
fn test_resolve_sheet_by_name_and_index() {
    let package = Package::read(Cursor::new(two_sheet_workbook().build())).unwrap();

    assert_eq!(
        package.resolve_sheet_by_name("BS_RE33").unwrap(),
        "xl/worksheets/sheet2.xml"
    );
    assert_eq!(
        package.resolve_sheet_by_index(1).unwrap(),
        "xl/worksheets/sheet1.xml"
    );
    assert_eq!(
        package.resolve_sheet_by_index(2).unwrap(),
        "xl/worksheets/sheet2.xml"
    );

    let names: Vec<String> = package.sheets().unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["Summary".to_string(), "BS_RE33".to_string()]);
}

#[test]
fn test_sheet_not_found() {
    let package = Package::read(Cursor::new(two_sheet_workbook().build())).unwrap();

    match package.resolve_sheet_by_name("bs_re33") {
        Err(XlsxError::SheetNotFound(name)) => assert_eq!(name, "bs_re33"),
        other => panic!("expected SheetNotFound, got {other:?}"),
    }
}

#[test]
fn test_sheet_with_dangling_relationship_is_not_found() {
    let mut package = Package::read(Cursor::new(two_sheet_workbook().build())).unwrap();
    let rels = String::from_utf8(package.part("xl/_rels/workbook.xml.rels").unwrap().to_vec())
        .unwrap()
        .replace(r#"Id="rId2""#, r#"Id="rId99""#);
    package.set_part("xl/_rels/workbook.xml.rels", rels.into_bytes());

    assert!(matches!(
        package.resolve_sheet_by_name("BS_RE33"),
        Err(XlsxError::SheetNotFound(_))
    ));
    assert!(matches!(
        package.resolve_sheet_by_index(2),
        Err(XlsxError::SheetNotFound(_))
    ));
}

#[test]
fn test_invalid_sheet_index() {
    let package = Package::read(Cursor::new(two_sheet_workbook().build())).unwrap();

    for index in [0, 3, 100] {
        match package.resolve_sheet_by_index(index) {
            Err(XlsxError::InvalidSheetIndex { index: i, count }) => {
                assert_eq!(i, index);
                assert_eq!(count, 2);
            }
            other => panic!("expected InvalidSheetIndex for {index}, got {other:?}"),
        }
    }
}

#[test]
fn test_write_keeps_every_part() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.xlsx");
    let dest = dir.path().join("dest.xlsx");
    two_sheet_workbook().write_to(&src);

    // An existing destination is replaced
    std::fs::write(&dest, b"stale").unwrap();

    let package = Package::open(&src).unwrap();
    package.write_file(&dest).unwrap();

    assert_eq!(read_parts(&dest), read_parts(&src));
    let reopened = Package::open(&dest).unwrap();
    assert_eq!(
        reopened.part_names().collect::<Vec<_>>(),
        package.part_names().collect::<Vec<_>>()
    );
}

#[test]
fn test_corrupt_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.xlsx");
    std::fs::write(&path, b"PK\x03\x04 definitely not a zip").unwrap();

    let err = Package::open(&path).unwrap_err();
    assert!(err.is_archive_corrupt(), "{err}");
}

#[test]
fn test_missing_content_types() {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        zip.start_file("xl/workbook.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        std::io::Write::write_all(&mut zip, b"<workbook/>").unwrap();
        zip.finish().unwrap();
    }

    let err = Package::read(Cursor::new(buf.into_inner())).unwrap_err();
    assert!(matches!(err, XlsxError::InvalidFormat(_)));
}

#[test]
fn test_malformed_workbook_xml() {
    let mut package = Package::read(Cursor::new(two_sheet_workbook().build())).unwrap();
    package.set_part("xl/workbook.xml", b"<workbook><sheets></workbook>".to_vec());

    let err = package.sheets().unwrap_err();
    assert!(err.is_archive_corrupt(), "{err}");
}
