//! Shared, cheaply-cloneable handle to every collaborator the sync
//! pipeline, watcher, and scheduler need. Bundled so `tokio::spawn`ed
//! per-file tasks can each hold an owned `'static` copy without threading
//! a dozen separate `Arc` clones through every function signature.

use crate::capabilities::{DocumentParser, EmbeddingProvider, SettingsStore};
use crate::config::EngineConfig;
use crate::events::EventBus;
use crate::state::EngineState;
use folderindex_store::{Ledger, VectorStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct Deps {
    pub ledger: Arc<Ledger>,
    pub vector_store: Arc<VectorStore>,
    pub state: Arc<EngineState>,
    pub settings: Arc<dyn SettingsStore>,
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub parser: Arc<dyn DocumentParser>,
    pub events: EventBus,
    pub config: EngineConfig,
}
