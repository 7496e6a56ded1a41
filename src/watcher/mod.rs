//! Directory watching with write-stability debouncing.
//!
//! # Architecture
//!
//! ```text
//! WatchManager (Stopped -> Starting -> Active -> Stopping)
//!   - caches WatchConfig, serializes transitions
//!   - follows config-change on the bus
//!         |
//!    WatchSession (one per configuration generation)
//!      - single notify::RecommendedWatcher, recursive
//!      - PathFilter (file types, dot paths)
//!      - Debouncer (size/mtime stability)
//!         |
//!    EventBus  <- file-change
//! ```

mod debouncer;
mod error;
mod filter;
mod hot_reload;
mod manager;
mod session;

pub use debouncer::{Debouncer, FileSnapshot};
pub use error::WatchError;
pub use filter::PathFilter;
pub use hot_reload::SettingsReloader;
pub use manager::{WatchManager, WatchManagerBuilder, WatchState};
pub use session::WatchSession;
