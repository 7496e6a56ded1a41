//! Delimited-text (CSV) parser with header-row mode and dynamic typing.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::{FormatParser, TableError, TableResult, file_name, unique_keys};
use crate::table::{Row, Table, Value, infer_headers};

/// Candidate delimiters, in preference order.
const DELIMITERS: [u8; 4] = [b',', b'\t', b'|', b';'];

/// Records sampled when guessing the delimiter.
const GUESS_SAMPLE: usize = 10;

/// Key that collects fields beyond the header width.
pub const EXTRA_FIELDS_KEY: &str = "__parsed_extra";

static FLOAT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*-?(\d+\.?|\.\d+|\d+\.\d+)([eE][-+]?\d+)?\s*$")
        .expect("float pattern is a valid regex")
});

/// Largest integer a double represents exactly (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub struct DelimitedParser;

impl FormatParser for DelimitedParser {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".csv"]
    }

    fn parse(&self, path: &Path) -> TableResult<Table> {
        let bytes = std::fs::read(path).map_err(|e| TableError::io(path, e))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| TableError::parse(path, format!("file is not valid UTF-8: {e}")))?;

        let rows = parse_delimited(&text).map_err(|reason| TableError::parse(path, reason))?;
        if rows.is_empty() {
            return Err(TableError::parse(path, "no data rows after the header row"));
        }

        let headers = infer_headers(rows.first());
        Ok(Table::new(headers, rows, file_name(path), "csv"))
    }
}

/// Parse delimited text into rows keyed by the header row.
///
/// Empty lines are dropped. Short rows omit the missing keys; long rows keep
/// the overflow under [`EXTRA_FIELDS_KEY`].
pub fn parse_delimited(text: &str) -> Result<Vec<Row>, String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let delimiter = guess_delimiter(text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| format!("record {}: {e}", idx + 1))?;
        if is_empty_record(&record) {
            continue;
        }

        let Some(keys) = headers.as_ref() else {
            headers = Some(unique_keys(record.iter().map(str::to_string)));
            continue;
        };

        let mut row = Row::with_capacity(keys.len());
        for (key, field) in keys.iter().zip(record.iter()) {
            row.insert(key.clone(), dynamic_value(field));
        }
        if record.len() > keys.len() {
            let extra = record
                .iter()
                .skip(keys.len())
                .map(|f| serde_json::Value::String(f.to_string()))
                .collect();
            row.insert(
                EXTRA_FIELDS_KEY.to_string(),
                Value::Json(serde_json::Value::Array(extra)),
            );
        }
        rows.push(row);
    }

    Ok(rows)
}

fn is_empty_record(record: &csv::StringRecord) -> bool {
    record.is_empty() || (record.len() == 1 && record[0].is_empty())
}

/// Pick the delimiter that splits the first records most consistently.
///
/// A candidate must average at least two fields per record. Among those the
/// one with the smallest field-count variation wins; ties go to the higher
/// field count. Falls back to a comma.
pub fn guess_delimiter(text: &str) -> u8 {
    let mut best: Option<(usize, f64, u8)> = None;

    for &delimiter in &DELIMITERS {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let counts: Vec<usize> = reader
            .records()
            .filter_map(Result::ok)
            .filter(|r| !is_empty_record(r))
            .take(GUESS_SAMPLE)
            .map(|r| r.len())
            .collect();

        if counts.is_empty() {
            continue;
        }

        let avg = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        if avg < 1.99 {
            continue;
        }

        let delta: usize = counts.windows(2).map(|w| w[0].abs_diff(w[1])).sum();

        let better = match best {
            None => true,
            Some((best_delta, best_avg, _)) => {
                delta < best_delta || (delta == best_delta && avg > best_avg)
            }
        };
        if better {
            best = Some((delta, avg, delimiter));
        }
    }

    best.map(|(_, _, d)| d).unwrap_or(b',')
}

/// Convert a raw field to a typed value.
///
/// `true`/`TRUE`/`false`/`FALSE` become booleans, plain decimal literals
/// become numbers (unless they are integers too large to hold exactly),
/// RFC 3339 date-times become dates, empty fields become null.
pub fn dynamic_value(field: &str) -> Value {
    match field {
        "true" | "TRUE" => return Value::Bool(true),
        "false" | "FALSE" => return Value::Bool(false),
        "" => return Value::Null,
        _ => {}
    }

    if FLOAT_PATTERN.is_match(field) {
        let trimmed = field.trim();
        if let Ok(number) = trimmed.parse::<f64>() {
            let integral = !trimmed.contains(|c: char| matches!(c, '.' | 'e' | 'E'));
            if integral && number.abs() > MAX_SAFE_INTEGER {
                return Value::String(field.to_string());
            }
            if integral {
                if let Ok(int) = trimmed.parse::<i64>() {
                    return Value::Int(int);
                }
            }
            return Value::Float(number);
        }
    }

    if field.contains('T') {
        if let Ok(date) = DateTime::parse_from_rfc3339(field) {
            return Value::Date(date.with_timezone(&Utc));
        }
    }

    Value::String(field.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_header_mode_with_typing() {
        let rows = parse_delimited("name,age,active,joined\nAda,36,true,2024-01-15\n").unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row["name"], Value::String("Ada".to_string()));
        assert_eq!(row["age"], Value::Int(36));
        assert_eq!(row["active"], Value::Bool(true));
        // Plain dates stay strings; inference classifies them later.
        assert_eq!(row["joined"], Value::String("2024-01-15".to_string()));
    }

    #[test]
    fn test_skips_empty_lines() {
        let rows = parse_delimited("a,b\n\n1,2\n\n3,4\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["a"], Value::Int(3));
    }

    #[test]
    fn test_header_only_has_no_rows() {
        assert!(parse_delimited("a,b,c\n").unwrap().is_empty());
        assert!(parse_delimited("").unwrap().is_empty());
    }

    #[test]
    fn test_ragged_rows() {
        let rows = parse_delimited("a,b,c\n1,2\n1,2,3,4,5\n").unwrap();

        let short = &rows[0];
        assert_eq!(short.len(), 2);
        assert!(!short.contains_key("c"));

        let long = &rows[1];
        assert_eq!(long["c"], Value::Int(3));
        assert_eq!(
            long[EXTRA_FIELDS_KEY],
            Value::Json(serde_json::json!(["4", "5"]))
        );
    }

    #[test]
    fn test_duplicate_headers_are_renamed() {
        let rows = parse_delimited("x,x,y,x\n1,2,3,4\n").unwrap();
        let keys: Vec<_> = rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["x", "x_1", "y", "x_2"]);
    }

    #[test]
    fn test_guess_delimiter() {
        assert_eq!(guess_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(guess_delimiter("a\tb\tc\n1\t2\t3\n"), b'\t');
        assert_eq!(guess_delimiter("a;b\n1,5;2,5\n"), b';');
        assert_eq!(guess_delimiter("single\nvalue\n"), b',');
    }

    #[test]
    fn test_quoted_fields() {
        let rows = parse_delimited("name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n").unwrap();
        assert_eq!(rows[0]["name"], Value::String("Smith, J".to_string()));
        assert_eq!(rows[0]["note"], Value::String("said \"hi\"".to_string()));
    }

    #[test]
    fn test_dynamic_values() {
        assert_eq!(dynamic_value("FALSE"), Value::Bool(false));
        assert_eq!(dynamic_value("True"), Value::String("True".to_string()));
        assert_eq!(dynamic_value("-2.5"), Value::Float(-2.5));
        assert_eq!(dynamic_value("1e3"), Value::Float(1000.0));
        assert_eq!(dynamic_value(""), Value::Null);
        assert_eq!(
            dynamic_value("12345678901234567890"),
            Value::String("12345678901234567890".to_string())
        );
        assert_eq!(
            dynamic_value("2024-03-01T12:00:00Z"),
            Value::Date(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(dynamic_value("0x10"), Value::String("0x10".to_string()));
    }

    #[test]
    fn test_strips_bom() {
        let rows = parse_delimited("\u{feff}id,v\n1,2\n").unwrap();
        assert!(rows[0].contains_key("id"));
    }
}
