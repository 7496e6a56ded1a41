//! Extension-based dispatch to format parsers plus metadata stamping.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::{
    DelimitedParser, FormatParser, JsonParser, SpreadsheetParser, TableError, TableResult,
    file_name,
};
use crate::table::Table;
use crate::utils::file_extension;

/// Turns a file path into a [`Table`].
///
/// Cheap to clone; parsers are shared.
#[derive(Clone)]
pub struct TableAssembler {
    parsers: Arc<Vec<Box<dyn FormatParser>>>,
}

impl TableAssembler {
    /// Assembler with the built-in csv, spreadsheet and JSON parsers.
    pub fn new() -> Self {
        Self::with_parsers(vec![
            Box::new(DelimitedParser),
            Box::new(SpreadsheetParser),
            Box::new(JsonParser),
        ])
    }

    pub fn with_parsers(parsers: Vec<Box<dyn FormatParser>>) -> Self {
        Self {
            parsers: Arc::new(parsers),
        }
    }

    /// All extensions (with leading dot) some parser handles.
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        self.parsers
            .iter()
            .flat_map(|p| p.extensions().iter().copied())
            .collect()
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.parser_for(&file_extension(path)).is_some()
    }

    fn parser_for(&self, extension: &str) -> Option<&dyn FormatParser> {
        self.parsers
            .iter()
            .find(|p| p.extensions().iter().any(|e| *e == extension))
            .map(|p| p.as_ref())
    }

    /// Parse `path` on the current thread.
    ///
    /// The file-derived metadata (`file_name`, `file_type`, `last_modified`,
    /// `file_path`, `file_size`) always comes from the filesystem.
    pub fn parse_file_blocking(&self, path: &Path) -> TableResult<Table> {
        let extension = file_extension(path);
        let parser = self
            .parser_for(&extension)
            .ok_or_else(|| TableError::UnsupportedFormat {
                extension: extension.clone(),
            })?;

        let stats = std::fs::metadata(path).map_err(|e| TableError::io(path, e))?;
        let started = Instant::now();

        let mut table = parser.parse(path).inspect_err(|e| {
            tracing::error!("[parser] {} failed for {}: {e}", parser.name(), path.display());
        })?;

        let metadata = &mut table.metadata;
        metadata.file_name = file_name(path);
        metadata.file_type = extension.trim_start_matches('.').to_string();
        metadata.last_modified = stats
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        metadata.file_path = Some(path.to_path_buf());
        metadata.file_size = Some(stats.len());
        metadata.row_count = table.rows.len();

        crate::debug_event!(
            "parser",
            "parsed",
            "{} rows, {} columns from {} in {:?}",
            table.rows.len(),
            table.headers.len(),
            path.display(),
            started.elapsed()
        );

        Ok(table)
    }

    /// Parse `path` on the blocking pool so other tasks keep running.
    pub async fn parse_file(&self, path: impl Into<PathBuf>) -> TableResult<Table> {
        let path = path.into();
        let assembler = self.clone();
        tokio::task::spawn_blocking(move || assembler.parse_file_blocking(&path))
            .await
            .map_err(|e| TableError::TaskFailed(e.to_string()))?
    }
}

impl Default for TableAssembler {
    fn default() -> Self {
        Self::new()
    }
}
