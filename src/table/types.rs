//! Uniform table model produced by every format parser.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

/// A single row: column key -> cell value, in first-seen column order.
pub type Row = IndexMap<String, Value>;

/// A typed cell value.
///
/// Parsers produce native variants where the source format carries type
/// information (spreadsheet cells, JSON literals, dynamically typed CSV
/// fields). Everything else stays a `String`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    /// Nested JSON (arrays, objects) kept verbatim.
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            nested => Value::Json(nested),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            // JSON has no representation for NaN or infinities.
            Value::Float(_) => serializer.serialize_none(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(d) => {
                serializer.serialize_str(&d.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::Json(v) => v.serialize(serializer),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Inferred column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Date,
    Boolean,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub sortable: bool,
    pub filterable: bool,
}

impl ColumnHeader {
    pub fn new(key: impl Into<String>, column_type: ColumnType) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            column_type,
            sortable: true,
            filterable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub file_name: String,
    pub file_type: String,
    pub last_modified: DateTime<Utc>,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// A parsed tabular file.
///
/// `metadata.row_count` always equals `rows.len()`; use [`Table::new`] to
/// keep it that way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub headers: Vec<ColumnHeader>,
    pub rows: Vec<Row>,
    pub metadata: TableMetadata,
}

impl Table {
    /// Build a table with provisional metadata.
    ///
    /// The file-derived fields are placeholders until the assembler stamps
    /// them from the filesystem.
    pub fn new(
        headers: Vec<ColumnHeader>,
        rows: Vec<Row>,
        file_name: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        let row_count = rows.len();
        Self {
            headers,
            rows,
            metadata: TableMetadata {
                file_name: file_name.into(),
                file_type: file_type.into(),
                last_modified: Utc::now(),
                row_count,
                file_path: None,
                file_size: None,
            },
        }
    }

    pub fn header(&self, key: &str) -> Option<&ColumnHeader> {
        self.headers.iter().find(|h| h.key == key)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
