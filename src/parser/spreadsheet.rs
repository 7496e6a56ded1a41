//! Spreadsheet parser (xlsx/xls) reading the first sheet only.

use std::path::Path;

use calamine::{Data, DataType, Range, Reader, open_workbook_auto};

use super::{FormatParser, TableError, TableResult, file_name, unique_keys};
use crate::table::{Row, Table, Value, infer_headers};

/// Key given to header cells that are blank.
const EMPTY_HEADER: &str = "__EMPTY";

/// Integral floats up to this magnitude are reported as integers.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_991.0;

pub struct SpreadsheetParser;

impl FormatParser for SpreadsheetParser {
    fn name(&self) -> &'static str {
        "excel"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".xlsx", ".xls"]
    }

    fn parse(&self, path: &Path) -> TableResult<Table> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| TableError::parse(path, format!("cannot open workbook: {e}")))?;

        let Some(sheet) = workbook.sheet_names().first().cloned() else {
            return Err(TableError::parse(path, "workbook contains no sheets"));
        };

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| TableError::parse(path, format!("cannot read sheet '{sheet}': {e}")))?;

        let rows = rows_from_range(&range);
        if rows.is_empty() {
            return Err(TableError::parse(
                path,
                format!("sheet '{sheet}' contains no data rows"),
            ));
        }

        let headers = infer_headers(rows.first());
        if headers.is_empty() {
            return Err(TableError::parse(path, "unable to extract headers"));
        }

        crate::debug_event!("parser", "sheet", "'{sheet}' of {}", path.display());
        Ok(Table::new(headers, rows, file_name(path), "excel"))
    }
}

/// Convert a cell range to rows keyed by its first row.
///
/// Blank cells become explicit nulls; rows with no content at all are dropped.
pub fn rows_from_range(range: &Range<Data>) -> Vec<Row> {
    let mut lines = range.rows();
    let Some(header_cells) = lines.next() else {
        return Vec::new();
    };

    let keys = unique_keys(header_cells.iter().map(header_name));

    lines
        .filter_map(|cells| {
            let row: Row = keys
                .iter()
                .zip(cells.iter())
                .map(|(key, cell)| (key.clone(), cell_value(cell)))
                .collect();
            (!row.values().all(Value::is_null)).then_some(row)
        })
        .collect()
}

fn header_name(cell: &Data) -> String {
    match cell {
        Data::Empty => EMPTY_HEADER.to_string(),
        Data::String(s) if s.trim().is_empty() => EMPTY_HEADER.to_string(),
        other => other.to_string(),
    }
}

/// Map a calamine cell to a table value, materializing dates.
pub fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Bool(b) => Value::Bool(*b),
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() <= MAX_EXACT_INT {
                Value::Int(*f as i64)
            } else {
                Value::Float(*f)
            }
        }
        Data::String(s) => Value::String(s.clone()),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) => Value::Date(dt.and_utc()),
            None => Value::String(cell.to_string()),
        },
        Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(e.to_string()),
    }
}
