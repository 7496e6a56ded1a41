//! Write-stability debouncing for file change events.
//!
//! A change is held back until the file's size and modification time have
//! stopped changing for the quiescence window, so a burst of writes yields
//! a single event once the writer is done.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::events::ChangeKind;

/// Observed state of a file, compared between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSnapshot {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl From<&std::fs::Metadata> for FileSnapshot {
    fn from(meta: &std::fs::Metadata) -> Self {
        Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        }
    }
}

#[derive(Debug)]
struct Pending {
    kind: ChangeKind,
    snapshot: Option<FileSnapshot>,
    stable_since: Instant,
}

/// Pending changes keyed by path.
///
/// Time is passed in by the caller so the logic stays deterministic.
#[derive(Debug)]
pub struct Debouncer {
    pending: HashMap<PathBuf, Pending>,
    quiescence: Duration,
}

impl Debouncer {
    pub fn new(quiescence: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            quiescence,
        }
    }

    /// Record a raw `added` or `modified` notification.
    ///
    /// Resets the stability timer. A path first seen as added stays added
    /// until it is reported.
    pub fn record(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) {
        self.pending
            .entry(path)
            .and_modify(|pending| {
                if kind == ChangeKind::Added {
                    pending.kind = ChangeKind::Added;
                }
                pending.stable_since = now;
            })
            .or_insert(Pending {
                kind,
                snapshot: None,
                stable_since: now,
            });
    }

    /// Drop a pending path, returning the kind it was waiting to report.
    pub fn cancel(&mut self, path: &Path) -> Option<ChangeKind> {
        self.pending.remove(path).map(|p| p.kind)
    }

    pub fn pending_paths(&self) -> Vec<PathBuf> {
        self.pending.keys().cloned().collect()
    }

    /// Feed a fresh observation of `path`.
    ///
    /// `None` means the file is gone: the entry is dropped and its pending
    /// kind returned. A snapshot that differs from the previous one restarts
    /// the stability timer.
    pub fn sample(
        &mut self,
        path: &Path,
        snapshot: Option<FileSnapshot>,
        now: Instant,
    ) -> Option<ChangeKind> {
        let Some(snapshot) = snapshot else {
            return self.cancel(path);
        };

        if let Some(pending) = self.pending.get_mut(path) {
            if pending.snapshot != Some(snapshot) {
                pending.snapshot = Some(snapshot);
                pending.stable_since = now;
            }
        }
        None
    }

    /// Take every path that has been sampled and stayed unchanged for the
    /// quiescence window.
    pub fn take_ready(&mut self, now: Instant) -> Vec<(PathBuf, ChangeKind)> {
        let mut ready = Vec::new();

        self.pending.retain(|path, pending| {
            let settled = pending.snapshot.is_some()
                && now.saturating_duration_since(pending.stable_since) >= self.quiescence;
            if settled {
                ready.push((path.clone(), pending.kind));
            }
            !settled
        });

        ready.sort_by(|a, b| a.0.cmp(&b.0));
        ready
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
