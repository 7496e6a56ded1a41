pub mod config;
pub mod config_store;
pub mod events;
pub mod io;
pub mod logging;
pub mod parser;
pub mod table;
pub mod utils;
pub mod watcher;

pub use config::{ConfigError, Settings, WatchConfig, WatchOptions};
pub use config_store::ConfigStore;
pub use events::{BusEvent, ChangeEvent, ChangeKind, EventBus, Subscription, Topic};
pub use parser::{TableAssembler, TableError, TableResult};
pub use table::{ColumnHeader, ColumnType, Row, Table, TableMetadata, Value};
pub use watcher::{WatchError, WatchManager, WatchState};
