//! Hot-reload of the settings file.
//!
//! Polls the settings file of a [`ConfigStore`] and reloads it when it
//! changes on disk, so editing `settings.toml` reconfigures a running
//! watcher without a restart.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;
use crate::config_store::ConfigStore;

/// Watches the settings file behind a [`ConfigStore`].
pub struct SettingsReloader {
    store: Arc<ConfigStore>,
    path: PathBuf,
    last_modified: Option<SystemTime>,
    check_interval: Duration,
}

impl SettingsReloader {
    /// Returns `None` for stores that are not backed by a file.
    pub fn new(store: Arc<ConfigStore>, check_interval: Duration) -> Option<Self> {
        let path = store.path()?.to_path_buf();
        let last_modified = modified_time(&path);

        Some(Self {
            store,
            path,
            last_modified,
            check_interval,
        })
    }

    /// Run on a background task until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = self.watch() => {}
            }
        })
    }

    /// Poll forever.
    pub async fn watch(mut self) {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        crate::debug_event!("config", "watching", "{}", self.path.display());

        loop {
            ticker.tick().await;

            if let Err(e) = self.check_and_reload() {
                tracing::error!("[config] reload failed: {e}");
            }
        }
    }

    /// Reload when the file's modification time moved. Returns whether new
    /// settings were published.
    pub fn check_and_reload(&mut self) -> Result<bool, ConfigError> {
        let Some(current) = modified_time(&self.path) else {
            tracing::trace!("[config] settings file missing");
            return Ok(false);
        };

        if self.last_modified == Some(current) {
            return Ok(false);
        }

        self.last_modified = Some(current);
        self.store.reload()
    }
}

fn modified_time(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}
