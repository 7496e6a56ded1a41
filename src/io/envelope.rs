//! Uniform JSON output envelope for CLI commands.
//!
//! Every `--json` response and every streamed bus event uses this shape,
//! so consumers can pipe `tablesync` output without per-command parsing.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::parser::TableError;
use crate::watcher::WatchError;

/// Schema version for this envelope format.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Message type for stream discrimination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Successful result (may contain data or be empty)
    Result,
    /// Error occurred
    Error,
    /// One item of a long-running stream (`tablesync watch`)
    Event,
}

/// Operation outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    NotFound,
    Error,
}

/// Machine-readable result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Ok,
    NotFound,
    ParseError,
    UnsupportedFormat,
    ConfigError,
    WatchError,
    InternalError,
}

impl From<&TableError> for ResultCode {
    fn from(error: &TableError) -> Self {
        match error {
            TableError::Parse { .. } => Self::ParseError,
            TableError::UnsupportedFormat { .. } => Self::UnsupportedFormat,
            TableError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                Self::NotFound
            }
            TableError::Io { .. } | TableError::TaskFailed(_) => Self::InternalError,
        }
    }
}

/// Entity type in the data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Table,
    FileList,
    Settings,
    BusEvent,
}

/// JSON output envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    #[serde(rename = "type")]
    pub message_type: MessageType,

    pub status: Status,

    pub code: ResultCode,

    /// Unix exit code (0-255)
    pub exit_code: u8,

    pub message: String,

    /// Suggested next step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Result payload (null on error)
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,

    pub meta: Meta,
}

/// Error details with suggestions and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

/// Response metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub schema_version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,

    /// Number of items in data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            entity_type: None,
            count: None,
            duration_ms: None,
        }
    }
}

impl<T> Envelope<T> {
    /// Create a success envelope with data.
    pub fn success(data: T) -> Self {
        Self {
            message_type: MessageType::Result,
            status: Status::Success,
            code: ResultCode::Ok,
            exit_code: 0,
            message: "Operation completed successfully".to_string(),
            hint: None,
            data: Some(data),
            error: None,
            meta: Meta::default(),
        }
    }

    /// Create a stream item envelope.
    pub fn event(data: T) -> Self {
        Self {
            message_type: MessageType::Event,
            ..Self::success(data)
        }
    }

    /// Create a not-found envelope.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Result,
            status: Status::NotFound,
            code: ResultCode::NotFound,
            exit_code: 1,
            message: message.into(),
            hint: None,
            data: None,
            error: None,
            meta: Meta::default(),
        }
    }

    /// Create an error envelope.
    pub fn error(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Error,
            status: Status::Error,
            code,
            exit_code: 2,
            message: message.into(),
            hint: None,
            data: None,
            error: None,
            meta: Meta::default(),
        }
    }

    /// Error envelope for a failed parse, carrying recovery suggestions.
    pub fn table_error(error: &TableError) -> Self {
        let code = ResultCode::from(error);
        let envelope = if code == ResultCode::NotFound {
            Self::not_found(error.to_string())
        } else {
            Self::error(code, error.to_string())
        };

        let suggestions: Vec<String> = error.suggestions().iter().map(|s| s.to_string()).collect();
        if suggestions.is_empty() {
            envelope
        } else {
            envelope.with_error_details(ErrorDetails {
                suggestions,
                context: None,
            })
        }
    }

    /// Error envelope for a configuration failure.
    pub fn config_error(error: &ConfigError) -> Self {
        let envelope = Self::error(ResultCode::ConfigError, error.to_string());
        match error {
            ConfigError::AlreadyExists { .. } => {
                envelope.with_hint("Run `tablesync init --force` to overwrite it")
            }
            ConfigError::Load(_) => {
                envelope.with_hint("Check the syntax of .tablesync/settings.toml")
            }
            ConfigError::Save { .. } => envelope,
        }
    }

    /// Error envelope for a watcher that could not be started.
    pub fn watch_error(error: &WatchError) -> Self {
        Self::error(ResultCode::WatchError, error.to_string())
            .with_hint("Check the watched directories and the system limit on file watches")
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.meta.entity_type = Some(entity_type);
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.meta.count = Some(count);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.meta.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error_details(mut self, details: ErrorDetails) -> Self {
        self.error = Some(details);
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error>
    where
        T: Serialize,
    {
        serde_json::to_string_pretty(self)
    }

    /// Serialize to compact JSON string (one line, for streaming).
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error>
    where
        T: Serialize,
    {
        serde_json::to_string(self)
    }
}
