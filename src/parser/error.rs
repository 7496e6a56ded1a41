//! Error types for table parsing.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from turning a file into a [`Table`](crate::table::Table).
#[derive(Error, Debug)]
pub enum TableError {
    /// The file content is malformed or holds no usable rows.
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// No parser is registered for the extension. Raised before any I/O.
    #[error("Unsupported file type: '{extension}'")]
    UnsupportedFormat { extension: String },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parser task failed: {0}")]
    TaskFailed(String),
}

impl TableError {
    pub fn parse(path: &Path, reason: impl Into<String>) -> Self {
        TableError::Parse {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        TableError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Recovery suggestions for CLI output.
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            TableError::Parse { .. } => vec![
                "Check that the file has a header row followed by at least one data row",
                "Spreadsheets are read from their first sheet only",
            ],
            TableError::UnsupportedFormat { .. } => {
                vec!["Supported extensions: .csv, .xlsx, .xls, .json"]
            }
            TableError::Io { .. } => vec!["Check that the file exists and is readable"],
            TableError::TaskFailed(_) => vec![],
        }
    }
}

pub type TableResult<T> = Result<T, TableError>;
