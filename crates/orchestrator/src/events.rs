//! Folder-change events (spec.md §6 "Events").
//!
//! A one-directional bus: the orchestrator publishes, observers (a future
//! UI, the watcher lifecycle) subscribe. Observers must call back into the
//! engine's public API rather than mutating state directly — spec.md §9
//! "Cyclic event flow".

use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum FolderEvent {
    Added { folder_id: Uuid, agent_id: Uuid },
    Removed { folder_id: Uuid, agent_id: Uuid },
    Updated { folder_id: Uuid },
    PrimaryChanged { folder_id: Uuid, agent_id: Uuid },
}

/// Thin wrapper over a [`broadcast::Sender`] so callers don't need to
/// depend on `tokio::sync::broadcast` directly.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FolderEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FolderEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: FolderEvent) {
        // No subscribers is the common case (headless sync) — not an error.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
