//! Lifecycle of the active watch session.

use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use super::error::WatchError;
use super::session::WatchSession;
use crate::config::{Settings, WatchConfig, WatchOptions};
use crate::events::{BusEvent, EventBus, Subscription, Topic};

/// Observable lifecycle state of a [`WatchManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchState {
    Stopped,
    Starting,
    Active,
    Stopping,
}

struct Slot {
    config: Option<WatchConfig>,
    options: WatchOptions,
    session: Option<WatchSession>,
    generation: u64,
    /// Set by `start`, cleared by `stop`. Stays set when a session fails to
    /// open so the next configuration retries.
    running: bool,
}

/// Live subscription to `config-change` feeding reconfiguration.
struct ConfigLink {
    subscription: Subscription,
    task: JoinHandle<()>,
}

struct ManagerInner {
    bus: EventBus,
    /// Serializes start/stop/reconfigure.
    slot: Mutex<Slot>,
    state_tx: watch::Sender<WatchState>,
    config_link: parking_lot::Mutex<Option<ConfigLink>>,
}

/// Owns the current watch configuration and at most one active session.
///
/// Transitions are serialized: two concurrent `reconfigure` calls never
/// interleave their close and open phases. Cheap to clone.
///
/// # Example
///
/// ```ignore
/// let bus = EventBus::new();
/// let manager = WatchManager::builder().bus(bus.clone()).build()?;
/// manager.init(WatchConfig::from(&settings.watching)).await?;
/// // ... config-change events now reconfigure the session ...
/// manager.shutdown().await;
/// ```
#[derive(Clone)]
pub struct WatchManager {
    inner: Arc<ManagerInner>,
}

impl WatchManager {
    pub fn new(bus: EventBus, options: WatchOptions) -> Self {
        let (state_tx, _) = watch::channel(WatchState::Stopped);
        Self {
            inner: Arc::new(ManagerInner {
                bus,
                slot: Mutex::new(Slot {
                    config: None,
                    options,
                    session: None,
                    generation: 0,
                    running: false,
                }),
                state_tx,
                config_link: parking_lot::Mutex::new(None),
            }),
        }
    }

    pub fn builder() -> WatchManagerBuilder {
        WatchManagerBuilder::new()
    }

    pub fn state(&self) -> WatchState {
        *self.inner.state_tx.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<WatchState> {
        self.inner.state_tx.subscribe()
    }

    /// The cached watch configuration, if one was ever supplied.
    pub async fn config(&self) -> Option<WatchConfig> {
        self.inner.slot.lock().await.config.clone()
    }

    /// Directory problems reported by the active session.
    pub async fn failures(&self) -> Vec<WatchError> {
        let slot = self.inner.slot.lock().await;
        slot.session
            .as_ref()
            .map(|s| s.failures().to_vec())
            .unwrap_or_default()
    }

    /// Absolute directories watched by the active session.
    pub async fn watched_directories(&self) -> Vec<std::path::PathBuf> {
        let slot = self.inner.slot.lock().await;
        slot.session
            .as_ref()
            .map(|s| s.directories().to_vec())
            .unwrap_or_default()
    }

    fn set_state(&self, state: WatchState) {
        let previous = self.inner.state_tx.send_replace(state);
        if previous != state {
            crate::debug_event!("watcher", "state", "{previous:?} -> {state:?}");
        }
    }

    /// Start watching `config`. An already running session is replaced.
    pub async fn start(&self, config: WatchConfig) -> Result<(), WatchError> {
        let mut slot = self.inner.slot.lock().await;
        self.set_state(WatchState::Starting);
        slot.config = Some(config);
        slot.running = true;
        self.open_session(&mut slot).await
    }

    /// Swap to `config`, closing the current session and opening a new one.
    ///
    /// On a stopped manager the config is only cached for the next start.
    /// A started manager whose last session failed to open tries again.
    /// Events in flight in the closing session may be lost.
    pub async fn reconfigure(&self, config: WatchConfig) -> Result<(), WatchError> {
        let mut slot = self.inner.slot.lock().await;
        let options = slot.options;
        self.transition(&mut slot, config, options).await
    }

    /// Apply the watch-related part of `settings`.
    pub async fn apply_settings(&self, settings: &Settings) -> Result<(), WatchError> {
        let config = WatchConfig::from(&settings.watching);
        let options = WatchOptions::from(&settings.watching);
        let mut slot = self.inner.slot.lock().await;
        self.transition(&mut slot, config, options).await
    }

    async fn transition(
        &self,
        slot: &mut Slot,
        config: WatchConfig,
        options: WatchOptions,
    ) -> Result<(), WatchError> {
        if !slot.running {
            crate::debug_event!("watcher", "config cached", "manager is stopped");
            slot.config = Some(config);
            slot.options = options;
            return Ok(());
        }

        if slot.session.is_some() && slot.config.as_ref() == Some(&config) && slot.options == options {
            crate::debug_event!("watcher", "config unchanged");
            return Ok(());
        }

        crate::log_event!(
            "watcher",
            "reconfiguring",
            "{} directories, types {:?}",
            config.directories.len(),
            config.file_types
        );

        self.set_state(WatchState::Starting);
        slot.config = Some(config);
        slot.options = options;
        self.open_session(slot).await
    }

    /// Close any current session and open one for the cached config.
    async fn open_session(&self, slot: &mut Slot) -> Result<(), WatchError> {
        if let Some(old) = slot.session.take() {
            old.close().await;
        }

        let Some(config) = slot.config.clone() else {
            self.set_state(WatchState::Stopped);
            return Err(WatchError::InitFailed {
                reason: "no watch configuration".to_string(),
            });
        };

        slot.generation += 1;
        match WatchSession::open(slot.generation, &config, slot.options, self.inner.bus.clone()).await {
            Ok(session) => {
                slot.session = Some(session);
                self.set_state(WatchState::Active);
                crate::log_event!("watcher", "started", "generation {}", slot.generation);
                Ok(())
            }
            Err(e) => {
                tracing::error!("[watcher] failed to open session: {e}");
                self.set_state(WatchState::Stopped);
                Err(e)
            }
        }
    }

    /// Close the active session. Idempotent.
    pub async fn stop(&self) {
        let mut slot = self.inner.slot.lock().await;
        slot.running = false;
        let Some(session) = slot.session.take() else {
            self.set_state(WatchState::Stopped);
            return;
        };

        self.set_state(WatchState::Stopping);
        session.close().await;
        self.set_state(WatchState::Stopped);
        crate::log_event!("watcher", "stopped");
    }

    /// Start watching and follow `config-change` events from then on.
    pub async fn init(&self, config: WatchConfig) -> Result<(), WatchError> {
        self.start(config).await?;
        self.bind_config_changes();
        Ok(())
    }

    /// Detach from `config-change` and stop.
    pub async fn shutdown(&self) {
        let link = self.inner.config_link.lock().take();
        if let Some(link) = link {
            link.subscription.unsubscribe();
            // Dropping the subscription closes the channel; the task drains and exits.
            drop(link.subscription);
            if let Err(e) = link.task.await {
                tracing::error!("[watcher] config listener failed: {e}");
            }
        }
        self.stop().await;
    }

    fn bind_config_changes(&self) {
        let mut link = self.inner.config_link.lock();
        if link.is_some() {
            return;
        }

        // Bus callbacks must not block; hand the snapshot to a task.
        let (tx, mut rx) = mpsc::unbounded_channel::<Settings>();
        let subscription = self.inner.bus.subscribe(Topic::ConfigChange, move |event| {
            if let BusEvent::ConfigChange(settings) = event {
                let _ = tx.send(settings.as_ref().clone());
            }
        });

        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            while let Some(mut settings) = rx.recv().await {
                // Only the latest snapshot matters
                while let Ok(newer) = rx.try_recv() {
                    settings = newer;
                }

                let Some(inner) = weak.upgrade() else { break };
                let manager = WatchManager { inner };
                if let Err(e) = manager.apply_settings(&settings).await {
                    tracing::error!("[watcher] reconfigure failed: {e}");
                }
            }
        });

        *link = Some(ConfigLink { subscription, task });
    }
}

/// Builder for constructing a [`WatchManager`].
pub struct WatchManagerBuilder {
    bus: Option<EventBus>,
    options: WatchOptions,
}

impl WatchManagerBuilder {
    pub fn new() -> Self {
        Self {
            bus: None,
            options: WatchOptions::default(),
        }
    }

    /// Set the event bus change events are published on.
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the quiescence window in milliseconds.
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.options.quiescence = std::time::Duration::from_millis(ms);
        self
    }

    pub fn initial_scan(mut self, enabled: bool) -> Self {
        self.options.initial_scan = enabled;
        self
    }

    pub fn build(self) -> Result<WatchManager, WatchError> {
        let bus = self.bus.ok_or_else(|| WatchError::InitFailed {
            reason: "Event bus is required".to_string(),
        })?;
        Ok(WatchManager::new(bus, self.options))
    }
}

impl Default for WatchManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
