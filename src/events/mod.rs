//! Typed publish/subscribe bus.
//!
//! Three topics exist: `file-change` (settled watcher events),
//! `config-change` (a new [`Settings`](crate::config::Settings) snapshot)
//! and `visualization-change` (forwarded from visualization storage).

mod bus;
mod types;

pub use bus::{EventBus, Subscription};
pub use types::{BusEvent, ChangeEvent, ChangeKind, Topic, VisualizationAction, VisualizationChange};
