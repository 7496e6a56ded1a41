//! Multi-format table parsing.
//!
//! Each supported format implements [`FormatParser`]. The [`TableAssembler`]
//! picks a parser by file extension and stamps filesystem metadata on the
//! result.
//!
//! # Architecture
//!
//! ```text
//! TableAssembler::parse_file(path)
//!   - extension lookup (UnsupportedFormat before any I/O)
//!   - stat for mtime/size
//!         |
//!    +-----------+-------------+--------+
//!    |           |             |
//! Delimited  Spreadsheet     Json
//!    \           |             /
//!     +---- infer_headers(row 0) ----+
//! ```

mod assembler;
pub mod delimited;
mod error;
pub mod json;
pub mod spreadsheet;

use std::collections::HashSet;
use std::path::Path;

pub use assembler::TableAssembler;
pub use delimited::DelimitedParser;
pub use error::{TableError, TableResult};
pub use json::JsonParser;
pub use spreadsheet::SpreadsheetParser;

use crate::table::Table;

/// A parser for one tabular file format.
pub trait FormatParser: Send + Sync {
    /// Short format name used in logs and provisional metadata.
    fn name(&self) -> &'static str;

    /// Lower-cased extensions, with the leading dot, this parser handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Parse the file at `path` into a table.
    ///
    /// Metadata on the returned table is provisional; the assembler
    /// overwrites the file-derived fields.
    fn parse(&self, path: &Path) -> TableResult<Table>;
}

/// Base name of `path` as an owned string.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Make column names unique by suffixing repeats with `_1`, `_2`, ...
pub(crate) fn unique_keys(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut keys = Vec::new();

    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 0;
        while seen.contains(&candidate) {
            suffix += 1;
            candidate = format!("{name}_{suffix}");
        }
        seen.insert(candidate.clone());
        keys.push(candidate);
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_keys() {
        let names = ["a", "b", "a", "a_1", "a"].map(String::from);
        assert_eq!(unique_keys(names), vec!["a", "b", "a_1", "a_1_1", "a_2"]);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(Path::new("/data/sales.csv")), "sales.csv");
        assert_eq!(file_name(Path::new("/")), "");
    }
}
