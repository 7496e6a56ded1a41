//! One filesystem-monitoring instance over a set of directories.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::debouncer::{Debouncer, FileSnapshot};
use super::error::WatchError;
use super::filter::PathFilter;
use crate::config::{WatchConfig, WatchOptions};
use crate::events::{BusEvent, ChangeEvent, ChangeKind, EventBus};
use crate::utils::ensure_directory_exists;

/// A running watch session.
///
/// Owns a single notify watcher covering every configured directory and a
/// worker task that debounces raw events and publishes settled
/// [`ChangeEvent`]s. Dropping the session cancels the worker; [`close`]
/// additionally waits for it to finish.
///
/// [`close`]: WatchSession::close
pub struct WatchSession {
    generation: u64,
    directories: Vec<PathBuf>,
    failures: Vec<WatchError>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchSession {
    /// Open a session for `config`.
    ///
    /// Missing directories are created. A directory that cannot be created
    /// or watched is recorded in [`failures`](Self::failures) and skipped;
    /// only failing to create the underlying watcher is an error.
    pub async fn open(
        generation: u64,
        config: &WatchConfig,
        options: WatchOptions,
        bus: EventBus,
    ) -> Result<Self, WatchError> {
        let mut failures = Vec::new();
        let mut roots = Vec::new();

        for dir in &config.directories {
            let absolute = match std::path::absolute(dir) {
                Ok(path) => path,
                Err(e) => {
                    record_failure(&mut failures, WatchError::PathWatchFailed {
                        path: dir.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if let Err(e) = ensure_directory_exists(&absolute).await {
                record_failure(&mut failures, WatchError::DirectoryCreate {
                    path: absolute,
                    reason: e.to_string(),
                });
                continue;
            }

            if !roots.contains(&absolute) {
                roots.push(absolute);
            }
        }

        // Create channel for events
        let (tx, rx) = mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        let mut watched = Vec::new();
        for root in roots {
            match watcher.watch(&root, RecursiveMode::Recursive) {
                Ok(()) => {
                    crate::debug_event!("session", "watching", "{}", root.display());
                    watched.push(root);
                }
                Err(e) => record_failure(&mut failures, WatchError::PathWatchFailed {
                    path: root,
                    reason: e.to_string(),
                }),
            }
        }

        let filter = PathFilter::new(watched.clone(), config);
        let cancel = CancellationToken::new();

        // Scanned after the watches are in place so no file falls in between
        let existing = {
            let roots = watched.clone();
            let filter = filter.clone();
            match tokio::task::spawn_blocking(move || scan_existing(&roots, &filter)).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::error!("[session] scan of existing files failed: {e}");
                    Vec::new()
                }
            }
        };

        let mut worker = SessionWorker {
            generation,
            filter,
            debouncer: Debouncer::new(options.quiescence),
            known: HashSet::new(),
            bus,
            _watcher: watcher,
        };
        worker.seed(existing, options.initial_scan);
        let task = tokio::spawn(worker.run(rx, options, cancel.clone()));

        crate::log_event!(
            "session",
            "opened",
            "generation {generation}, {} of {} directories",
            watched.len(),
            config.directories.len()
        );

        Ok(Self {
            generation,
            directories: watched,
            failures,
            cancel,
            task: Some(task),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Absolute directories successfully being watched.
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Per-directory problems encountered while opening.
    pub fn failures(&self) -> &[WatchError] {
        &self.failures
    }

    /// Cancel the worker and wait for it to exit.
    ///
    /// Pending debounced changes are discarded; no event from this session
    /// is published after `close` returns.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("[session] worker for generation {} failed: {e}", self.generation);
            }
        }
        crate::log_event!("session", "closed", "generation {}", self.generation);
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn record_failure(failures: &mut Vec<WatchError>, error: WatchError) {
    tracing::warn!("[session] {error}");
    failures.push(error);
}

/// Raw notification reduced to what the debouncer needs.
#[derive(Debug, PartialEq, Eq)]
enum RawChange {
    Upsert(ChangeKind),
    Removed,
}

/// Classify a notify event into per-path changes.
fn classify(event: &Event) -> Vec<(PathBuf, RawChange)> {
    let all = |change: fn() -> RawChange| -> Vec<(PathBuf, RawChange)> {
        event.paths.iter().map(|p| (p.clone(), change())).collect()
    };

    match event.kind {
        EventKind::Create(_) => all(|| RawChange::Upsert(ChangeKind::Added)),
        EventKind::Remove(_) => all(|| RawChange::Removed),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => all(|| RawChange::Removed),
            RenameMode::To => all(|| RawChange::Upsert(ChangeKind::Added)),
            // Always preceded by its From and To halves
            RenameMode::Both => Vec::new(),
            // Backends that cannot tell the two halves apart
            _ => event
                .paths
                .iter()
                .map(|p| {
                    let change = if p.exists() {
                        RawChange::Upsert(ChangeKind::Added)
                    } else {
                        RawChange::Removed
                    };
                    (p.clone(), change)
                })
                .collect(),
        },
        EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions
            | MetadataKind::Ownership
            | MetadataKind::Extended
            | MetadataKind::AccessTime,
        )) => Vec::new(),
        EventKind::Modify(_) => all(|| RawChange::Upsert(ChangeKind::Modified)),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Files already present under `roots` that pass `filter`.
fn scan_existing(roots: &[PathBuf], filter: &PathFilter) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for root in roots {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
            });

        for entry in walker.filter_map(Result::ok) {
            if entry.file_type().is_file() && filter.accepts(entry.path()) {
                found.push(entry.into_path());
            }
        }
    }
    found
}

struct SessionWorker {
    generation: u64,
    filter: PathFilter,
    debouncer: Debouncer,
    /// Files this session has seen on disk or reported as present.
    known: HashSet<PathBuf>,
    bus: EventBus,
    /// Kept alive for the lifetime of the worker.
    _watcher: notify::RecommendedWatcher,
}

impl SessionWorker {
    async fn run(
        mut self,
        mut event_rx: mpsc::Receiver<notify::Result<Event>>,
        options: WatchOptions,
        cancel: CancellationToken,
    ) {
        let mut ticker = interval(options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    if self.debouncer.has_pending() {
                        self.poll().await;
                    }
                }

                res = event_rx.recv() => match res {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => {
                        let error = WatchError::EventError { details: e.to_string() };
                        tracing::error!("[session] {error}");
                    }
                    None => {
                        tracing::warn!("[session] {}", WatchError::ChannelClosed);
                        break;
                    }
                },
            }
        }

        crate::debug_event!(
            "session",
            "worker exited",
            "generation {}, {} pending discarded",
            self.generation,
            self.debouncer.pending_count()
        );
    }

    /// Remember the files already on disk, reporting them as added when
    /// `announce` is set.
    fn seed(&mut self, existing: Vec<PathBuf>, announce: bool) {
        crate::debug_event!("session", "existing files", "{}", existing.len());
        let now = Instant::now();
        for path in existing {
            if announce {
                self.debouncer.record(path.clone(), ChangeKind::Added, now);
            }
            self.known.insert(path);
        }
    }

    fn handle_event(&mut self, event: Event) {
        for (path, change) in classify(&event) {
            if !self.filter.accepts(&path) {
                crate::debug_event!("session", "ignored", "{:?} {}", event.kind, path.display());
                continue;
            }

            match change {
                RawChange::Upsert(kind) => {
                    // A file moved over a known one replaces its content
                    let kind = if kind == ChangeKind::Added && self.known.contains(&path) {
                        ChangeKind::Modified
                    } else {
                        kind
                    };
                    self.debouncer.record(path, kind, Instant::now());
                }
                RawChange::Removed => self.handle_removal(path),
            }
        }
    }

    /// Removals are reported immediately, unless the file was never
    /// reported as added in the first place.
    fn handle_removal(&mut self, path: PathBuf) {
        match self.debouncer.cancel(&path) {
            Some(ChangeKind::Added) => {
                crate::debug_event!("session", "transient file", "{}", path.display());
                self.known.remove(&path);
            }
            _ => self.publish(ChangeKind::Removed, path),
        }
    }

    /// Sample every pending path and publish the ones that settled.
    async fn poll(&mut self) {
        for path in self.debouncer.pending_paths() {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => {
                    self.debouncer.cancel(&path);
                }
                Ok(meta) => {
                    self.debouncer
                        .sample(&path, Some(FileSnapshot::from(&meta)), Instant::now());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Gone before it settled
                    if let Some(kind) = self.debouncer.sample(&path, None, Instant::now()) {
                        if kind == ChangeKind::Added {
                            crate::debug_event!("session", "transient file", "{}", path.display());
                            self.known.remove(&path);
                        } else {
                            self.publish(ChangeKind::Removed, path);
                        }
                    }
                }
                Err(e) => {
                    crate::debug_event!("session", "stat failed", "{}: {e}", path.display());
                }
            }
        }

        for (path, kind) in self.debouncer.take_ready(Instant::now()) {
            self.publish(kind, path);
        }
    }

    fn publish(&mut self, kind: ChangeKind, path: PathBuf) {
        crate::log_event!("watcher", kind.as_str(), "{}", path.display());
        if kind == ChangeKind::Removed {
            self.known.remove(&path);
        } else {
            self.known.insert(path.clone());
        }
        self.bus
            .publish(BusEvent::FileChange(ChangeEvent::new(kind, path)));
    }
}
