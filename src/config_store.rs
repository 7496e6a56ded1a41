//! Shared, observable settings.
//!
//! [`ConfigStore`] holds the current [`Settings`] snapshot. Every accepted
//! change is published on the bus as `config-change`, which is how a
//! running watch manager learns about new directories or file types.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::config::{ConfigError, Settings};
use crate::events::{BusEvent, EventBus};

pub struct ConfigStore {
    /// Backing settings file; `None` for purely in-memory stores.
    path: Option<PathBuf>,
    current: RwLock<Settings>,
    bus: EventBus,
}

impl ConfigStore {
    /// In-memory store. Updates are published but never persisted.
    pub fn new(settings: Settings, bus: EventBus) -> Self {
        Self {
            path: None,
            current: RwLock::new(settings),
            bus,
        }
    }

    /// Store backed by `path`, loaded through the usual layering.
    pub fn open(path: impl Into<PathBuf>, bus: EventBus) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings = Settings::load_from(&path)?;
        crate::debug_event!("config", "loaded", "{}", path.display());
        Ok(Self {
            path: Some(path),
            current: RwLock::new(settings),
            bus,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the current settings.
    pub fn current(&self) -> Settings {
        self.current.read().clone()
    }

    /// Apply `change`, persist the result when file-backed, then publish it.
    ///
    /// Nothing is published or swapped in if saving fails.
    pub fn update<F>(&self, change: F) -> Result<Settings, ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let next = {
            let mut current = self.current.write();
            let mut next = current.clone();
            change(&mut next);

            if let Some(path) = &self.path {
                next.save(path)?;
            }
            *current = next.clone();
            next
        };

        crate::log_event!("config", "updated");
        self.bus.publish(BusEvent::ConfigChange(Box::new(next.clone())));
        Ok(next)
    }

    /// Re-read the backing file. Publishes and returns `true` only when the
    /// loaded settings differ from the current ones.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };

        let loaded = Settings::load_from(path)?;
        {
            let mut current = self.current.write();
            if *current == loaded {
                crate::debug_event!("config", "reload unchanged");
                return Ok(false);
            }
            *current = loaded.clone();
        }

        crate::log_event!("config", "reloaded", "{}", path.display());
        self.bus.publish(BusEvent::ConfigChange(Box::new(loaded)));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Topic;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_update_persists_and_publishes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".tablesync/settings.toml");
        let bus = EventBus::new();
        let (_sub, mut rx) = bus.subscribe_channel(Topic::ConfigChange);

        let store = ConfigStore::open(&path, bus).unwrap();
        let updated = store
            .update(|s| s.watching.file_types = vec![".json".to_string()])
            .unwrap();

        assert_eq!(store.current(), updated);
        assert_eq!(
            Settings::load_from(&path).unwrap().watching.file_types,
            vec![".json"]
        );
        match rx.try_recv().unwrap() {
            BusEvent::ConfigChange(settings) => {
                assert_eq!(settings.watching.file_types, vec![".json"])
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_reload_publishes_only_on_change() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        Settings::default().save(&path).unwrap();

        let bus = EventBus::new();
        let (_sub, mut rx) = bus.subscribe_channel(Topic::ConfigChange);
        let store = ConfigStore::open(&path, bus).unwrap();

        assert!(!store.reload().unwrap());
        assert!(rx.try_recv().is_err());

        fs::write(&path, "[watching]\ndebounce_ms = 10\n").unwrap();
        assert!(store.reload().unwrap());
        assert_eq!(store.current().watching.debounce_ms, 10);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_in_memory_store() {
        let bus = EventBus::new();
        let store = ConfigStore::new(Settings::default(), bus.clone());
        let (_sub, mut rx) = bus.subscribe_channel(Topic::ConfigChange);

        assert!(store.path().is_none());
        assert!(!store.reload().unwrap());

        store.update(|s| s.watching.debounce_ms = 5).unwrap();
        assert_eq!(store.current().watching.debounce_ms, 5);
        assert!(rx.try_recv().is_ok());
    }
}
