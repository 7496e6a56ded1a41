//! Layered configuration.
//!
//! Sources, later ones winning:
//! - Built-in defaults
//! - `.tablesync/settings.toml` (nearest ancestor of the current directory)
//! - Environment variables
//!
//! # Environment Variables
//!
//! Variables are prefixed with `TABLESYNC_` and use double underscores to
//! separate nested levels:
//! - `TABLESYNC_WATCHING__DEBOUNCE_MS=500` sets `watching.debounce_ms`
//! - `TABLESYNC_LOGGING__DEFAULT=debug` sets `logging.default`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory holding the settings file.
pub const CONFIG_DIR: &str = ".tablesync";
pub const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "TABLESYNC_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Failed to save configuration to {path}: {reason}")]
    Save { path: PathBuf, reason: String },

    #[error("Configuration file already exists at {path}. Use --force to overwrite")]
    AlreadyExists { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub watching: WatchingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchingConfig {
    /// Directories to monitor, relative to the working directory unless absolute
    #[serde(default = "default_directories")]
    pub directories: Vec<PathBuf>,

    /// Extensions (with leading dot) that produce change events
    #[serde(default = "default_file_types")]
    pub file_types: Vec<String>,

    /// How long a file must stay unchanged before it is reported
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How often pending files are re-checked for stability
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Report files already present when watching starts as `added`
    #[serde(default = "default_true")]
    pub initial_scan: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level for all targets
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `tablesync::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_directories() -> Vec<PathBuf> {
    vec![PathBuf::from("./data"), PathBuf::from("./uploads")]
}
fn default_file_types() -> Vec<String> {
    vec![".csv".to_string(), ".xlsx".to_string(), ".json".to_string()]
}
fn default_debounce_ms() -> u64 {
    2000
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watching: WatchingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchingConfig {
    fn default() -> Self {
        Self {
            directories: default_directories(),
            file_types: default_file_types(),
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            initial_scan: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Load configuration with `path` as the settings file.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_layered(path.as_ref(), ENV_PREFIX)
    }

    fn load_layered(path: &Path, env_prefix: &str) -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(env_prefix).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".") // Double underscore becomes dot
                    .into()
            }))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Settings file of the nearest workspace, or `.tablesync/settings.toml`
    /// below the current directory when none exists yet.
    pub fn config_path() -> PathBuf {
        Self::find_workspace_config().unwrap_or_else(|| Path::new(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Find the settings file by looking for a `.tablesync` directory
    /// from the current directory up to the root.
    pub fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Save current configuration to file as pretty TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let save_err = |reason: String| ConfigError::Save {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| save_err(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| save_err(e.to_string()))?;
        std::fs::write(path, toml_string).map_err(|e| save_err(e.to_string()))?;

        crate::debug_event!("config", "saved", "{}", path.display());
        Ok(())
    }

    /// Create a default settings file below the current directory.
    pub fn init_config_file(force: bool) -> Result<PathBuf, ConfigError> {
        let config_path = Path::new(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err(ConfigError::AlreadyExists { path: config_path });
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

/// What the watch manager monitors: a set of directories and the file
/// extensions that produce change events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    pub directories: Vec<PathBuf>,
    pub file_types: Vec<String>,
}

impl WatchConfig {
    /// Build a config, normalizing extensions to lower case with a leading
    /// dot and dropping duplicates.
    pub fn new<D, T>(directories: D, file_types: T) -> Self
    where
        D: IntoIterator,
        D::Item: Into<PathBuf>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        let mut types: Vec<String> = Vec::new();
        for raw in file_types {
            let trimmed = raw.as_ref().trim();
            if trimmed.is_empty() || trimmed == "." {
                continue;
            }
            let normalized = format!(".{}", trimmed.trim_start_matches('.').to_lowercase());
            if !types.contains(&normalized) {
                types.push(normalized);
            }
        }

        Self {
            directories: directories.into_iter().map(Into::into).collect(),
            file_types: types,
        }
    }

    /// Whether `extension` (lower case, with dot) is watched.
    pub fn watches_extension(&self, extension: &str) -> bool {
        self.file_types.iter().any(|t| t == extension)
    }
}

impl From<&WatchingConfig> for WatchConfig {
    fn from(config: &WatchingConfig) -> Self {
        WatchConfig::new(config.directories.iter().cloned(), &config.file_types)
    }
}

/// Timing knobs of a watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Time a file must stay unchanged before `added`/`modified` is reported.
    pub quiescence: Duration,
    /// Sampling period for pending files.
    pub poll_interval: Duration,
    pub initial_scan: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from(&WatchingConfig::default())
    }
}

impl From<&WatchingConfig> for WatchOptions {
    fn from(config: &WatchingConfig) -> Self {
        Self {
            quiescence: Duration::from_millis(config.debounce_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            initial_scan: config.initial_scan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(
            settings.watching.directories,
            vec![PathBuf::from("./data"), PathBuf::from("./uploads")]
        );
        assert_eq!(settings.watching.file_types, vec![".csv", ".xlsx", ".json"]);
        assert_eq!(settings.watching.debounce_ms, 2000);
        assert_eq!(settings.watching.poll_interval_ms, 100);
        assert!(settings.watching.initial_scan);
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[watching]
directories = ["/srv/incoming"]
file_types = [".csv"]
debounce_ms = 250

[logging.modules]
"tablesync::watcher" = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.watching.directories, vec![PathBuf::from("/srv/incoming")]);
        assert_eq!(settings.watching.file_types, vec![".csv"]);
        assert_eq!(settings.watching.debounce_ms, 250);
        // Unspecified values keep their defaults
        assert_eq!(settings.watching.poll_interval_ms, 100);
        assert_eq!(settings.logging.modules["tablesync::watcher"], "debug");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.watching, WatchingConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[watching]\ndebounce_ms = \"soon\"\n").unwrap();

        let err = Settings::load_from(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested/settings.toml");

        let mut settings = Settings::default();
        settings.watching.file_types = vec![".json".to_string()];
        settings.watching.debounce_ms = 50;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.watching, settings.watching);
    }

    #[test]
    fn test_env_override() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[logging]\ndefault = \"info\"\n").unwrap();

        // Private prefix so concurrent tests loading settings are unaffected
        unsafe {
            std::env::set_var("TSYNC_ENV_TEST_LOGGING__DEFAULT", "trace");
            std::env::set_var("TSYNC_ENV_TEST_WATCHING__DEBOUNCE_MS", "500");
        }
        let settings = Settings::load_layered(&config_path, "TSYNC_ENV_TEST_");
        unsafe {
            std::env::remove_var("TSYNC_ENV_TEST_LOGGING__DEFAULT");
            std::env::remove_var("TSYNC_ENV_TEST_WATCHING__DEBOUNCE_MS");
        }

        let settings = settings.unwrap();
        assert_eq!(settings.logging.default, "trace");
        assert_eq!(settings.watching.debounce_ms, 500);
    }

    #[test]
    fn test_watch_config_normalizes_types() {
        let config = WatchConfig::new(["./data"], ["CSV", ".xlsx", ".csv", " .Json ", ""]);
        assert_eq!(config.file_types, vec![".csv", ".xlsx", ".json"]);
        assert!(config.watches_extension(".json"));
        assert!(!config.watches_extension(".txt"));
    }

    #[test]
    fn test_watch_options_from_settings() {
        let watching = WatchingConfig {
            debounce_ms: 300,
            poll_interval_ms: 0,
            initial_scan: false,
            ..WatchingConfig::default()
        };
        let options = WatchOptions::from(&watching);
        assert_eq!(options.quiescence, Duration::from_millis(300));
        assert_eq!(options.poll_interval, Duration::from_millis(1));
        assert!(!options.initial_scan);
    }
}
