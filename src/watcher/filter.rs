//! Path filtering for watch sessions.

use std::path::{Component, Path, PathBuf};

use crate::config::WatchConfig;
use crate::utils::file_extension;

/// Decides which raw filesystem paths a session reports on.
#[derive(Debug, Clone)]
pub struct PathFilter {
    roots: Vec<PathBuf>,
    config: WatchConfig,
}

impl PathFilter {
    /// `roots` must be the absolute directories the session watches.
    pub fn new(roots: Vec<PathBuf>, config: &WatchConfig) -> Self {
        Self {
            roots,
            config: config.clone(),
        }
    }

    /// Whether `path` has one of the configured extensions.
    pub fn is_watched_type(&self, path: &Path) -> bool {
        let extension = file_extension(path);
        !extension.is_empty() && self.config.watches_extension(&extension)
    }

    /// Whether a component below the watched root starts with a dot.
    ///
    /// The root itself may live under a dot directory; only the part of
    /// the path inside the root is checked.
    pub fn is_hidden(&self, path: &Path) -> bool {
        let relative = self
            .roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or_else(|| path.file_name().map(Path::new).unwrap_or(path));

        relative.components().any(|component| match component {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        })
    }

    pub fn accepts(&self, path: &Path) -> bool {
        self.is_watched_type(path) && !self.is_hidden(path)
    }
}
