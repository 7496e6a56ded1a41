//! Column type inference from a single representative row.
//!
//! Only the first row is inspected. A column whose first value looks
//! numeric stays `number` even if later rows hold free text; callers
//! that need per-cell guarantees must validate on their own.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{ColumnHeader, ColumnType, Row, Value};

/// `YYYY-M-D` or `YYYY/MM/DD` with 1-2 digit month and day.
static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}[/\-](0?[1-9]|1[012])[/\-](0?[1-9]|[12][0-9]|3[01])$")
        .expect("date pattern is a valid regex")
});

/// Build one header per key of `row`, preserving key order.
///
/// An absent or empty row yields no headers.
pub fn infer_headers(row: Option<&Row>) -> Vec<ColumnHeader> {
    let Some(row) = row else {
        return Vec::new();
    };

    row.iter()
        .map(|(key, value)| ColumnHeader::new(key.clone(), infer_type(value)))
        .collect()
}

/// Classify a single value.
pub fn infer_type(value: &Value) -> ColumnType {
    match value {
        Value::Int(_) | Value::Float(_) => ColumnType::Number,
        Value::Bool(_) => ColumnType::Boolean,
        Value::Date(_) => ColumnType::Date,
        Value::String(s) => infer_string_type(s),
        Value::Null | Value::Json(_) => ColumnType::String,
    }
}

fn infer_string_type(s: &str) -> ColumnType {
    if looks_like_date(s) {
        ColumnType::Date
    } else if looks_like_number(s) {
        ColumnType::Number
    } else {
        ColumnType::String
    }
}

/// True if `s` matches the `YYYY[-/]M[-/]D` date shape.
pub fn looks_like_date(s: &str) -> bool {
    DATE_PATTERN.is_match(s)
}

/// True if the trimmed string is non-empty and converts to a number in full.
///
/// Accepts decimal literals with optional sign, fraction and exponent,
/// `Infinity`, and unsigned `0x`/`0o`/`0b` integer literals.
pub fn looks_like_number(raw: &str) -> bool {
    let s = raw.trim();
    if s.is_empty() {
        return false;
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = s.strip_prefix(prefix) {
            return !digits.is_empty() && digits.chars().all(|c| c.is_digit(radix));
        }
    }

    let unsigned = s.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(s);
    if unsigned == "Infinity" {
        return true;
    }

    // Rust's float grammar also accepts "inf" and "nan"; rule them out first.
    let allowed = |b: u8| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-');
    if !unsigned.bytes().all(allowed) {
        return false;
    }

    s.parse::<f64>().is_ok()
}
