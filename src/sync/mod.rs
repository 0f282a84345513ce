pub mod config;

mod engine;
mod events;
mod queue;

pub use config::{ConfigError, SyncConfig};
pub use engine::{EngineOptions, SyncEngine};
pub use events::{EventBus, TabEntry, TabsSnapshot, WorkspaceEvent};
pub use queue::WorkspaceHandle;
