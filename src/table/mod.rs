//! Table model and column type inference.

pub mod inference;
mod types;

pub use inference::{infer_headers, infer_type, looks_like_date, looks_like_number};
pub use types::{ColumnHeader, ColumnType, Row, Table, TableMetadata, Value};
