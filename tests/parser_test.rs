//! End-to-end parsing of real files through the assembler.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use tablesync::{ColumnType, TableAssembler, TableError, Value};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
  <Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

/// Style 1 uses the built-in short date format (numFmtId 14).
const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <cellXfs count="2">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
    <xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>
  </cellXfs>
</styleSheet>"#;

fn workbook_xml(with_sheet: bool) -> String {
    let sheets = if with_sheet {
        r#"<sheets><sheet name="Inventory" sheetId="1" r:id="rId1"/></sheets>"#
    } else {
        "<sheets/>"
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">{sheets}</workbook>"#
    )
}

const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="1">
      <c r="A1" t="inlineStr"><is><t>item</t></is></c>
      <c r="B1" t="inlineStr"><is><t>qty</t></is></c>
      <c r="C1" t="inlineStr"><is><t>in_stock</t></is></c>
      <c r="D1" t="inlineStr"><is><t>received</t></is></c>
    </row>
    <row r="2">
      <c r="A2" t="inlineStr"><is><t>bolt</t></is></c>
      <c r="B2"><v>12</v></c>
      <c r="C2" t="b"><v>1</v></c>
      <c r="D2" s="1"><v>45306</v></c>
    </row>
    <row r="3">
      <c r="A3" t="inlineStr"><is><t>nut</t></is></c>
      <c r="B3"><v>2.5</v></c>
      <c r="C3" t="b"><v>0</v></c>
      <c r="D3" s="1"><v>45307</v></c>
    </row>
  </sheetData>
</worksheet>"#;

/// Write a minimal xlsx package.
fn write_xlsx(path: &Path, with_sheet: bool) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();

    let mut parts: Vec<(&str, String)> = vec![
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", workbook_xml(with_sheet)),
    ];
    if with_sheet {
        parts.push(("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()));
        parts.push(("xl/worksheets/sheet1.xml", SHEET.to_string()));
        parts.push(("xl/styles.xml", STYLES.to_string()));
    }

    for (name, content) in parts {
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_csv_file_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "people.csv",
        "name,age,joined,active\nAlice,30,2024-01-15,true\nBob,25,2023-12-01,false\n",
    );

    let table = TableAssembler::new().parse_file(&path).await.unwrap();

    let types: Vec<_> = table.headers.iter().map(|h| h.column_type).collect();
    assert_eq!(
        types,
        vec![
            ColumnType::String,
            ColumnType::Number,
            ColumnType::Date,
            ColumnType::Boolean
        ]
    );
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[1]["name"], Value::String("Bob".to_string()));
    assert_eq!(table.rows[0]["age"], Value::Int(30));
    assert_eq!(table.metadata.file_name, "people.csv");
    assert_eq!(table.metadata.file_type, "csv");
    assert_eq!(table.metadata.row_count, 2);
}

#[tokio::test]
async fn test_json_file_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "orders.json",
        r#"[
            {"id": 1, "price": "3.14", "placed": "2024/1/5", "paid": true, "meta": {"src": "web"}},
            {"id": 2, "price": "9", "placed": "2024/1/6", "paid": false, "meta": null}
        ]"#,
    );

    let table = TableAssembler::new().parse_file(&path).await.unwrap();

    assert_eq!(table.header("id").unwrap().column_type, ColumnType::Number);
    assert_eq!(table.header("price").unwrap().column_type, ColumnType::Number);
    assert_eq!(table.header("placed").unwrap().column_type, ColumnType::Date);
    assert_eq!(table.header("paid").unwrap().column_type, ColumnType::Boolean);
    assert_eq!(table.header("meta").unwrap().column_type, ColumnType::String);
    assert_eq!(table.metadata.file_type, "json");
}

#[tokio::test]
async fn test_xlsx_file_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("inventory.xlsx");
    write_xlsx(&path, true);

    let table = TableAssembler::new().parse_file(&path).await.unwrap();

    let keys: Vec<_> = table.headers.iter().map(|h| h.key.as_str()).collect();
    assert_eq!(keys, vec!["item", "qty", "in_stock", "received"]);
    assert_eq!(table.header("qty").unwrap().column_type, ColumnType::Number);
    assert_eq!(
        table.header("in_stock").unwrap().column_type,
        ColumnType::Boolean
    );
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0]["qty"], Value::Int(12));
    assert_eq!(table.rows[1]["qty"], Value::Float(2.5));
    assert_eq!(
        table.header("received").unwrap().column_type,
        ColumnType::Date
    );
    assert_eq!(
        table.rows[0]["received"],
        Value::Date(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap())
    );
    assert_eq!(table.metadata.file_type, "xlsx");
}

#[tokio::test]
async fn test_workbook_without_sheets_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.xlsx");
    write_xlsx(&path, false);

    let err = TableAssembler::new().parse_file(&path).await.unwrap_err();
    assert!(matches!(err, TableError::Parse { .. }), "{err:?}");
}

#[tokio::test]
async fn test_header_only_csv_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "header.csv", "a,b,c\n");

    let err = TableAssembler::new().parse_file(&path).await.unwrap_err();
    assert!(matches!(err, TableError::Parse { .. }), "{err:?}");
}

#[tokio::test]
async fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "notes.txt", "hello");

    let err = TableAssembler::new().parse_file(&path).await.unwrap_err();
    match err {
        TableError::UnsupportedFormat { extension } => assert_eq!(extension, ".txt"),
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reparse_unchanged_file_is_identical() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "stable.csv", "k,v\na,1\nb,2\n");
    let assembler = TableAssembler::new();

    let first = assembler.parse_file(&path).await.unwrap();
    let second = assembler.parse_file(&path).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn test_table_wire_format() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "wire.csv", "when,n\n2024-03-01T10:00:00Z,7\n");

    let table = TableAssembler::new().parse_file(&path).await.unwrap();
    let json = serde_json::to_value(&table).unwrap();

    assert_eq!(json["headers"][0]["type"], "date");
    assert_eq!(json["headers"][0]["label"], "when");
    assert_eq!(json["headers"][0]["sortable"], true);
    assert_eq!(json["rows"][0]["when"], "2024-03-01T10:00:00.000Z");
    assert_eq!(json["rows"][0]["n"], 7);
    assert_eq!(json["metadata"]["fileName"], "wire.csv");
    assert_eq!(json["metadata"]["rowCount"], 1);
}

#[tokio::test]
async fn test_json_scalar_array_parses_with_empty_headers() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "numbers.json", "[1, 2]");

    let table = TableAssembler::new().parse_file(&path).await.unwrap();

    assert!(table.headers.is_empty());
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.metadata.row_count, 2);
}
