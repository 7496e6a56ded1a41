//! JSON parser: an array of objects, or a single object treated as one row.

use std::path::Path;

use super::{FormatParser, TableError, TableResult, file_name};
use crate::table::{Row, Table, Value, infer_headers};

pub struct JsonParser;

impl FormatParser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".json"]
    }

    fn parse(&self, path: &Path) -> TableResult<Table> {
        let text = std::fs::read_to_string(path).map_err(|e| TableError::io(path, e))?;
        let rows = parse_json_rows(&text).map_err(|reason| TableError::parse(path, reason))?;
        let headers = infer_headers(rows.first());
        Ok(Table::new(headers, rows, file_name(path), "json"))
    }
}

/// Parse JSON text into rows.
///
/// A top-level value that is not an array is wrapped as a one-element array.
/// Key order follows the source document. Elements that are not objects
/// have no keys and become empty rows.
pub fn parse_json_rows(text: &str) -> Result<Vec<Row>, String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let document: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;

    let items = match document {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    let rows = items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect::<Row>(),
            _ => Row::new(),
        })
        .collect();
    Ok(rows)
}
