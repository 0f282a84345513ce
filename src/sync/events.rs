use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::workspace::{Directory, DocumentId};

/// Capacity of the event channel; slow subscribers past this lag and skip ahead.
const EVENT_CAPACITY: usize = 64;

/// An open tab, as seen by observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabEntry {
    pub id: DocumentId,
    pub path: String,
}

/// Copy of the tab set at one moment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TabsSnapshot {
    pub tabs: Vec<TabEntry>,
    pub active: Option<TabEntry>,
}

impl TabsSnapshot {
    pub fn paths(&self) -> Vec<&str> {
        self.tabs.iter().map(|t| t.path.as_str()).collect()
    }
}

/// Change notifications emitted by a workspace
#[derive(Debug, Clone)]
pub enum WorkspaceEvent {
    TreeChanged(Arc<Directory>),
    TabsChanged(TabsSnapshot),
    DocumentSaved { path: String },
    Closed,
}

/// Broadcast side of the workspace event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkspaceEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.sender.subscribe()
    }

    /// Send to every current subscriber. Having none is not an error.
    pub fn emit(&self, event: WorkspaceEvent) {
        let _ = self.sender.send(event);
    }
}
