//! The orchestrator's public facade (spec.md §6 "Exposed operations").
//!
//! `Engine` is the single entry point an embedding application talks to: it
//! owns every collaborator in [`Deps`], the live [`WatcherRegistry`], and
//! the background [`Scheduler`]'s ticker handle. Mirrors how the teacher's
//! `server` crate wraps its session/indexing state behind one `AppState`
//! struct injected into every handler.

use crate::capabilities::{DocumentParser, EmbeddingProvider, SettingsStore, TaskEventKind};
use crate::config::EngineConfig;
use crate::deps::Deps;
use crate::error::{Error, Result};
use crate::events::{EventBus, FolderEvent};
use crate::lifecycle;
use crate::scheduler::{self, Scheduler};
use crate::state::EngineState;
use crate::sync::{self, SyncOutcome, WatcherDecision};
use crate::watcher::WatcherRegistry;
use folderindex_core::{
    now_millis, path_safety, ChunkPreset, FolderRecord, FolderStatus, IndexingMode,
    LastRunMetadata, ReindexPolicy, SyncMode, SyncTrigger,
};
use folderindex_store::{Ledger, SearchHit, SearchOptions, VectorStore};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Optional per-call overrides for [`Engine::add_folder`]; everything else
/// on a newly registered folder takes the folder-record defaults.
#[derive(Debug, Clone, Default)]
pub struct AddFolderOptions {
    pub recursive: Option<bool>,
    pub include_extensions: Option<HashSet<String>>,
    pub exclude_patterns: Option<Vec<String>>,
    pub file_type_filters: Option<HashSet<String>>,
    pub max_file_size_bytes: Option<u64>,
    pub chunk_preset: Option<ChunkPreset>,
    pub indexing_mode: Option<IndexingMode>,
    pub sync_mode: Option<SyncMode>,
    pub sync_cadence_minutes: Option<u32>,
    pub reindex_policy: Option<ReindexPolicy>,
}

/// Mutable folder settings an agent may change after registration (spec.md
/// §4.6 "update_folder_settings").
#[derive(Debug, Clone, Default)]
pub struct FolderSettingsUpdate {
    pub recursive: Option<bool>,
    pub include_extensions: Option<HashSet<String>>,
    pub exclude_patterns: Option<Vec<String>>,
    pub file_type_filters: Option<HashSet<String>>,
    pub max_file_size_bytes: Option<u64>,
    pub chunk_preset: Option<ChunkPreset>,
    pub chunk_size_override: Option<Option<usize>>,
    pub chunk_overlap_override: Option<Option<usize>>,
    pub indexing_mode: Option<IndexingMode>,
    pub sync_mode: Option<SyncMode>,
    pub sync_cadence_minutes: Option<u32>,
    pub reindex_policy: Option<ReindexPolicy>,
}

pub struct SearchRequest {
    pub agent_id: Uuid,
    pub query_vector: Vec<f32>,
    pub top_k: usize,
    pub folder_id: Option<Uuid>,
    pub lexical_query: Option<Vec<f32>>,
    pub lexical_weight: f32,
}

/// The engine singleton. Construct once per process with [`Engine::new`],
/// call [`Engine::initialize`] once at startup, and hold it for the
/// process's lifetime (spec.md §9 "the process's own lifecycle").
pub struct Engine {
    deps: Deps,
    watchers: Arc<WatcherRegistry>,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(
        ledger: Ledger,
        vector_store: VectorStore,
        config: EngineConfig,
        embedding: Arc<dyn EmbeddingProvider>,
        parser: Arc<dyn DocumentParser>,
    ) -> Self {
        let settings: Arc<dyn SettingsStore> = Arc::new(config.clone());
        let deps = Deps {
            ledger: Arc::new(ledger),
            vector_store: Arc::new(vector_store),
            state: Arc::new(EngineState::new()),
            settings,
            embedding,
            parser,
            events: EventBus::new(),
            config,
        };
        Self { deps, watchers: Arc::new(WatcherRegistry::new()), ticker: std::sync::Mutex::new(None) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FolderEvent> {
        self.deps.events.subscribe()
    }

    // -------------------------------------------------------------
    // Folder registration & lifecycle (spec.md §4.6, §6)
    // -------------------------------------------------------------

    /// Register a new folder: normalize + check its path, reject duplicates
    /// under the same agent, and insert a `pending` row (spec.md §4.1, §4.6
    /// invariant I3).
    pub fn add_folder(
        &self,
        agent_id: Uuid,
        user_id: Uuid,
        path: &Path,
        options: AddFolderOptions,
    ) -> Result<FolderRecord> {
        let normalized = path_safety::normalize(path);
        if let path_safety::Verdict::Unsafe(message) = path_safety::check(&normalized) {
            return Err(Error::UnsafePath(message));
        }
        let folder_path = normalized.to_string_lossy().to_string();

        let existing_count = self.deps.ledger.count_folders_for_agent(agent_id)?;
        let folder = FolderRecord {
            folder_id: Uuid::new_v4(),
            agent_id,
            user_id,
            folder_path,
            recursive: options.recursive.unwrap_or(true),
            include_extensions: options.include_extensions.unwrap_or_default(),
            exclude_patterns: options.exclude_patterns.unwrap_or_default(),
            file_type_filters: options.file_type_filters.unwrap_or_default(),
            max_file_size_bytes: options
                .max_file_size_bytes
                .unwrap_or(self.deps.config.default_max_file_size_bytes),
            chunk_preset: options.chunk_preset.unwrap_or(ChunkPreset::Balanced),
            chunk_size_override: None,
            chunk_overlap_override: None,
            indexing_mode: options.indexing_mode.unwrap_or(IndexingMode::Auto),
            sync_mode: options.sync_mode.unwrap_or(SyncMode::Auto),
            sync_cadence_minutes: options.sync_cadence_minutes.unwrap_or(15),
            reindex_policy: options.reindex_policy.unwrap_or(ReindexPolicy::Smart),
            status: FolderStatus::Pending,
            last_error: None,
            last_synced_at: None,
            updated_at: now_millis(),
            file_count: 0,
            chunk_count: 0,
            skip_reasons: HashMap::new(),
            last_run_metadata: LastRunMetadata::default(),
            embedding_model: None,
            is_primary: existing_count == 0,
        };

        self.deps.ledger.insert_folder(&folder).map_err(|e| match e {
            folderindex_store::StoreError::DuplicateFolder(path) => Error::DuplicateFolder(path),
            other => Error::Store(other),
        })?;
        self.deps.events.publish(FolderEvent::Added { folder_id: folder.folder_id, agent_id });

        let behavior = crate::mode::resolve(&folder, self.deps.settings.vector_db_enabled());
        if behavior.allows_automatic_add_sync {
            let deps = self.deps.clone();
            let folder_id = folder.folder_id;
            tokio::spawn(async move {
                let _ = sync::sync_folder(&deps, folder_id, None, false, SyncTrigger::Auto).await;
            });
        }

        Ok(folder)
    }

    pub fn get_folder(&self, folder_id: Uuid) -> Result<Option<FolderRecord>> {
        Ok(self.deps.ledger.get_folder(folder_id)?)
    }

    pub fn get_folders(&self, agent_id: Uuid) -> Result<Vec<FolderRecord>> {
        Ok(self.deps.ledger.get_folders_for_agent(agent_id)?)
    }

    pub fn get_all_folders(&self) -> Result<Vec<FolderRecord>> {
        Ok(self.deps.ledger.get_all_folders()?)
    }

    pub async fn remove_folder(&self, folder_id: Uuid) -> Result<()> {
        lifecycle::remove_folder(&self.deps, &self.watchers, folder_id).await
    }

    pub async fn remove_file(&self, folder_id: Uuid, file_path: &str) -> Result<()> {
        lifecycle::remove_file(&self.deps, folder_id, file_path).await
    }

    pub fn set_primary(&self, folder_id: Uuid, agent_id: Uuid) -> Result<()> {
        lifecycle::set_primary(&self.deps, folder_id, agent_id)
    }

    /// Apply a partial settings patch and persist it (spec.md §4.6
    /// "update_folder_settings"). Does not itself trigger a resync; callers
    /// that want one should follow up with [`Engine::sync_folder`].
    pub fn update_folder_settings(
        &self,
        folder_id: Uuid,
        update: FolderSettingsUpdate,
    ) -> Result<FolderRecord> {
        let mut folder =
            self.deps.ledger.get_folder(folder_id)?.ok_or(Error::FolderNotFound(folder_id))?;

        if let Some(v) = update.recursive {
            folder.recursive = v;
        }
        if let Some(v) = update.include_extensions {
            folder.include_extensions = v;
        }
        if let Some(v) = update.exclude_patterns {
            folder.exclude_patterns = v;
        }
        if let Some(v) = update.file_type_filters {
            folder.file_type_filters = v;
        }
        if let Some(v) = update.max_file_size_bytes {
            folder.max_file_size_bytes = v;
        }
        if let Some(v) = update.chunk_preset {
            folder.chunk_preset = v;
        }
        if let Some(v) = update.chunk_size_override {
            folder.chunk_size_override = v;
        }
        if let Some(v) = update.chunk_overlap_override {
            folder.chunk_overlap_override = v;
        }
        if let Some(v) = update.indexing_mode {
            folder.indexing_mode = v;
        }
        if let Some(v) = update.sync_mode {
            folder.sync_mode = v;
        }
        if let Some(v) = update.sync_cadence_minutes {
            folder.sync_cadence_minutes = v;
        }
        if let Some(v) = update.reindex_policy {
            folder.reindex_policy = v;
        }
        folder.updated_at = now_millis();

        self.deps.ledger.update_folder(&folder)?;
        self.deps.events.publish(FolderEvent::Updated { folder_id });
        Ok(folder)
    }

    // -------------------------------------------------------------
    // Sync (spec.md §4.7)
    // -------------------------------------------------------------

    pub async fn sync_folder(
        &self,
        folder_id: Uuid,
        parallel: Option<usize>,
        force: bool,
        trigger: SyncTrigger,
    ) -> Result<SyncOutcome> {
        let outcome = sync::sync_folder(&self.deps, folder_id, parallel, force, trigger).await?;
        self.apply_watcher_decision(folder_id, outcome.watcher_decision)?;
        Ok(outcome)
    }

    fn apply_watcher_decision(&self, folder_id: Uuid, decision: WatcherDecision) -> Result<()> {
        match decision {
            WatcherDecision::Start { polling } => {
                if let Some(folder) = self.deps.ledger.get_folder(folder_id)? {
                    self.watchers.start(&self.deps, folder.clone(), polling)?;
                }
            }
            WatcherDecision::Stop => {
                if let Some(folder) = self.deps.ledger.get_folder(folder_id)? {
                    self.watchers.stop(&self.deps, folder_id, &folder.folder_path);
                }
            }
            WatcherDecision::NoChange => {}
        }
        Ok(())
    }

    /// Sync every folder belonging to `agent_id` in turn (spec.md §6
    /// "sync_all_for_agent").
    pub async fn sync_all_for_agent(&self, agent_id: Uuid, trigger: SyncTrigger) -> Result<Vec<Result<SyncOutcome>>> {
        let folders = self.deps.ledger.get_folders_for_agent(agent_id)?;
        let mut results = Vec::with_capacity(folders.len());
        for folder in folders {
            results.push(self.sync_folder(folder.folder_id, None, false, trigger).await);
        }
        Ok(results)
    }

    /// Sync every folder in `status=pending` (spec.md §6
    /// "sync_pending_folders").
    pub async fn sync_pending_folders(&self) -> Result<usize> {
        let pending = self.deps.ledger.get_folders_by_status(FolderStatus::Pending)?;
        let mut count = 0;
        for folder in pending {
            if self.sync_folder(folder.folder_id, None, false, SyncTrigger::Auto).await.is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }

    pub async fn sync_stale_folders(&self) -> Result<usize> {
        scheduler::sync_stale_folders(&self.deps).await
    }

    pub async fn reindex_agent(&self, agent_id: Uuid) -> Result<Vec<Result<()>>> {
        lifecycle::reindex_agent(&self.deps, agent_id).await
    }

    pub async fn reindex_all(&self) -> Result<()> {
        lifecycle::reindex_all(&self.deps).await
    }

    // -------------------------------------------------------------
    // Recovery & cleanup (spec.md §4.9)
    // -------------------------------------------------------------

    pub async fn recover_stuck_syncing_folders(&self) -> Result<usize> {
        scheduler::recover_stuck_syncing_folders(&self.deps).await
    }

    pub async fn force_cleanup_stuck_folders(&self) -> Result<usize> {
        scheduler::force_cleanup_stuck_folders(&self.deps).await
    }

    /// Drop any agent vector table with no corresponding folder rows left
    /// (spec.md §4.5 "orphaned tables"), e.g. after a crash mid-removal.
    pub fn cleanup_orphaned_vector_tables(&self) -> Result<usize> {
        let folders = self.deps.ledger.get_all_folders()?;
        let live_agents: HashSet<Uuid> = folders.iter().map(|f| f.agent_id).collect();
        Ok(self.deps.vector_store.cleanup_orphaned(&live_agents)?)
    }

    // -------------------------------------------------------------
    // Background scheduler & watchers (spec.md §4.8, §4.9)
    // -------------------------------------------------------------

    /// Run the startup recovery sequence and begin the periodic scheduler
    /// tick (spec.md §4.9). Idempotent-ish: calling it twice just starts a
    /// second ticker, so callers should call it once at process startup.
    pub async fn initialize(self: &Arc<Self>) {
        self.start_background_sync().await;
    }

    pub async fn start_background_sync(self: &Arc<Self>) {
        let scheduler = Arc::new(Scheduler::new(self.deps.clone(), self.watchers.clone()));
        let handle = scheduler.start().await;
        *self.ticker.lock().unwrap() = Some(handle);
    }

    pub fn stop_background_sync(&self) {
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn is_watching(&self, folder_id: Uuid) -> bool {
        self.watchers.is_watching(folder_id)
    }

    pub fn stop_all_watchers(&self) {
        self.watchers.stop_all(&self.deps);
    }

    // -------------------------------------------------------------
    // Search (spec.md §4.5 "Query")
    // -------------------------------------------------------------

    // -------------------------------------------------------------
    // Task-registry coordination (spec.md §4.8 "Chat-run coordination")
    // -------------------------------------------------------------

    /// Forward a `task:started`/`task:completed` event from the host
    /// application's task registry. Only `"chat"` tasks gate watcher
    /// batches; other task types are counted but otherwise ignored, per
    /// spec.md §4.8: "On `started` for a chat task, increment the agent's
    /// counter. On `completed`, decrement; when it reaches zero, move
    /// every `deferred` file for that agent's folders into its `queue`
    /// and trigger a batch."
    pub fn handle_task_event(&self, event: TaskEventKind, task_type: &str, agent_id: Uuid) -> Result<()> {
        if task_type != "chat" {
            return Ok(());
        }
        match event {
            TaskEventKind::Started => {
                self.deps.state.begin_chat_run(agent_id);
            }
            TaskEventKind::Completed => {
                if self.deps.state.end_chat_run(agent_id) == 0 {
                    let folder_ids: Vec<Uuid> = self
                        .deps
                        .ledger
                        .get_folders_for_agent(agent_id)?
                        .into_iter()
                        .map(|f| f.folder_id)
                        .collect();
                    crate::watcher::promote_deferred(&tokio::runtime::Handle::current(), &self.deps, &folder_ids);
                }
            }
        }
        Ok(())
    }

    pub fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>> {
        let options = SearchOptions {
            top_k: request.top_k,
            folder_id: request.folder_id,
            lexical_query: request.lexical_query,
            lexical_weight: request.lexical_weight,
        };
        Ok(self.deps.vector_store.search(request.agent_id, &request.query_vector, &options)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{LocalLexicalEmbeddingProvider, PlainTextDocumentParser};

    fn make_engine(base: &Path) -> Engine {
        Engine::new(
            Ledger::open_in_memory().unwrap(),
            VectorStore::new(base.join("vectors")).unwrap(),
            EngineConfig::default(),
            Arc::new(LocalLexicalEmbeddingProvider::default()),
            Arc::new(PlainTextDocumentParser),
        )
    }

    #[test]
    fn add_folder_rejects_unsafe_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = make_engine(tmp.path());
        let result = engine.add_folder(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Path::new("/"),
            AddFolderOptions::default(),
        );
        assert!(matches!(result, Err(Error::UnsafePath(_))));
    }

    #[test]
    fn add_folder_rejects_duplicate_path_for_same_agent() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = make_engine(tmp.path());
        let agent = Uuid::new_v4();
        let path = tmp.path().join("proj");
        engine.add_folder(agent, agent, &path, AddFolderOptions::default()).unwrap();

        let result = engine.add_folder(agent, agent, &path, AddFolderOptions::default());
        assert!(matches!(result, Err(Error::DuplicateFolder(_))));
    }

    #[test]
    fn first_folder_for_agent_is_primary() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = make_engine(tmp.path());
        let agent = Uuid::new_v4();
        let mut options = AddFolderOptions::default();
        options.sync_mode = Some(SyncMode::Manual);
        let folder = engine
            .add_folder(agent, Uuid::new_v4(), &tmp.path().join("proj"), options)
            .unwrap();
        assert!(folder.is_primary);
    }

    #[tokio::test]
    async fn completed_chat_task_promotes_deferred_batch_for_other_task_types_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = make_engine(tmp.path());
        let agent = Uuid::new_v4();

        // A non-chat task type never touches the counter.
        engine.handle_task_event(TaskEventKind::Started, "embedding-job", agent).unwrap();
        assert_eq!(engine.deps.state.active_chat_runs(agent), 0);

        engine.handle_task_event(TaskEventKind::Started, "chat", agent).unwrap();
        assert_eq!(engine.deps.state.active_chat_runs(agent), 1);

        // Completing drops the counter to zero and is safe to call even
        // though the agent has no folders registered.
        engine.handle_task_event(TaskEventKind::Completed, "chat", agent).unwrap();
        assert_eq!(engine.deps.state.active_chat_runs(agent), 0);
    }
}
