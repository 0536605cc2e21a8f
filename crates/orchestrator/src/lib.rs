//! Sync control plane for the folder-to-vector indexing engine: per-folder
//! sync runs, file watchers, deferred queues, and the background scheduler
//! (spec.md §4.7-§4.9, §6).

pub mod capabilities;
pub mod config;
pub mod deps;
pub mod engine;
pub mod error;
pub mod events;
pub mod extensions;
pub mod lifecycle;
pub mod mode;
pub mod pipeline;
pub mod scheduler;
pub mod state;
pub mod sync;
pub mod watcher;

pub use capabilities::{
    DocumentParser, EmbeddingProvider, PlainTextDocumentParser, SettingsStore, TaskEventKind,
};
pub use config::EngineConfig;
pub use engine::{AddFolderOptions, Engine, FolderSettingsUpdate, SearchRequest};
pub use error::{Error, Result};
pub use events::FolderEvent;
pub use sync::{SyncOutcome, SyncSummary, WatcherDecision};
