//! Topics and payloads carried on the event bus.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Settings;

/// Named channel on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    FileChange,
    ConfigChange,
    VisualizationChange,
}

impl Topic {
    pub const ALL: [Topic; 3] = [
        Topic::FileChange,
        Topic::ConfigChange,
        Topic::VisualizationChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::FileChange => "file-change",
            Topic::ConfigChange => "config-change",
            Topic::VisualizationChange => "visualization-change",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }
}

/// A settled change to a watched file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationAction {
    Create,
    Update,
    Delete,
}

/// A visualization definition changed. Produced outside this crate and
/// forwarded unchanged to bus subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationChange {
    pub action: VisualizationAction,
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Everything that can be published on the bus.
///
/// Each variant belongs to exactly one [`Topic`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "topic", content = "payload", rename_all = "kebab-case")]
pub enum BusEvent {
    FileChange(ChangeEvent),
    ConfigChange(Box<Settings>),
    VisualizationChange(VisualizationChange),
}

impl BusEvent {
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::FileChange(_) => Topic::FileChange,
            BusEvent::ConfigChange(_) => Topic::ConfigChange,
            BusEvent::VisualizationChange(_) => Topic::VisualizationChange,
        }
    }
}
