//! Output handling for the CLI.
//!
//! Commands print human-readable text by default and a uniform JSON
//! [`Envelope`] with `--json`; `tablesync watch` streams one compact
//! envelope per bus event.

pub mod envelope;

pub use envelope::{
    EntityType, Envelope, ErrorDetails, MessageType, Meta, ResultCode, SCHEMA_VERSION, Status,
};
