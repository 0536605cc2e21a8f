//! Background scheduler (spec.md §4.9): the process-wide periodic tick
//! plus startup recovery, grounded in the teacher's own
//! `tokio::spawn` + `tokio::time::interval` session-cleanup task
//! (`server/src/main.rs`).

use crate::deps::Deps;
use crate::error::Result;
use crate::mode;
use crate::sync::sync_folder;
use crate::watcher::WatcherRegistry;
use folderindex_core::{now_millis, path_safety, FolderStatus, SyncTrigger};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

pub struct Scheduler {
    deps: Deps,
    watchers: Arc<WatcherRegistry>,
}

impl Scheduler {
    pub fn new(deps: Deps, watchers: Arc<WatcherRegistry>) -> Self {
        Self { deps, watchers }
    }

    /// Run the startup sequence (spec.md §4.9 steps 1-5) and return a
    /// handle to the periodic ticker (step 6). Keep the handle alive, or
    /// call `.abort()` on it, to stop background sync.
    pub async fn start(self: Arc<Self>) -> JoinHandle<()> {
        self.watchers.stop_all(&self.deps);

        match recover_stuck_syncing_folders(&self.deps).await {
            Ok(n) if n > 0 => info!(recovered = n, "recovered stuck syncing folders on startup"),
            Err(e) => warn!(error = %e, "recovery sweep failed"),
            _ => {}
        }

        if let Err(e) = flip_unsafe_paths_to_error(&self.deps).await {
            warn!(error = %e, "unsafe-path sweep failed");
        }

        if let Err(e) = restart_watchers_for_synced(&self.deps, &self.watchers).await {
            warn!(error = %e, "failed to restart watchers on startup");
        }

        let deps = self.deps.clone();
        tokio::spawn(async move {
            if let Err(e) = sync_stale_folders(&deps).await {
                warn!(error = %e, "startup sync_stale_folders failed");
            }
        });

        let this = self.clone();
        tokio::spawn(async move { this.run_ticker().await })
    }

    async fn run_ticker(self: Arc<Self>) {
        let minutes = self.deps.config.scheduler_interval_minutes();
        let mut interval = tokio::time::interval(Duration::from_secs(minutes as u64 * 60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        if self.deps.state.scheduler_in_progress.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = sync_stale_folders(&self.deps).await {
            warn!(error = %e, "scheduled sync_stale_folders failed");
        }
        self.deps.state.scheduler_in_progress.store(false, Ordering::SeqCst);
    }
}

/// Any folder in `status=syncing` whose `updated_at` is older than
/// `recovery_stale_minutes` and isn't tracked live is flipped to
/// `synced`/`error` (or `paused` if its path is now unsafe).
pub async fn recover_stuck_syncing_folders(deps: &Deps) -> Result<usize> {
    let stuck = deps.ledger.get_folders_by_status(FolderStatus::Syncing)?;
    let now = now_millis();
    let threshold_ms = deps.config.recovery_stale_minutes * 60_000;
    let mut recovered = 0usize;

    for folder in stuck {
        if deps.state.is_syncing(folder.folder_id) {
            continue;
        }
        if now - folder.updated_at < threshold_ms {
            continue;
        }

        let has_indexed =
            folder.file_count > 0 || !deps.ledger.get_files_for_folder(folder.folder_id)?.is_empty();
        let (status, message) =
            match path_safety::check(Path::new(&folder.folder_path)) {
                path_safety::Verdict::Unsafe(msg) => (FolderStatus::Paused, Some(msg)),
                path_safety::Verdict::Safe if has_indexed => (FolderStatus::Synced, None),
                path_safety::Verdict::Safe => (FolderStatus::Error, None),
            };
        deps.ledger.set_status(folder.folder_id, status, message.as_deref())?;
        recovered += 1;
    }
    Ok(recovered)
}

/// Flip every non-owned folder whose path is unsafe to `error` (spec.md
/// §4.9 step 3). Runs after recovery, so an unsafe stuck folder that
/// recovery just paused ends up `error` here instead — the broader rule
/// wins (documented as an Open Question resolution in DESIGN.md).
async fn flip_unsafe_paths_to_error(deps: &Deps) -> Result<usize> {
    let mut count = 0usize;
    for folder in deps.ledger.get_all_folders()? {
        if deps.state.is_syncing(folder.folder_id) {
            continue;
        }
        if let path_safety::Verdict::Unsafe(msg) = path_safety::check(Path::new(&folder.folder_path))
        {
            deps.ledger.set_status(folder.folder_id, FolderStatus::Error, Some(&msg))?;
            count += 1;
        }
    }
    Ok(count)
}

async fn restart_watchers_for_synced(deps: &Deps, watchers: &Arc<WatcherRegistry>) -> Result<()> {
    for folder in deps.ledger.get_folders_by_status(FolderStatus::Synced)? {
        let behavior = mode::resolve(&folder, deps.settings.vector_db_enabled());
        if behavior.allows_watcher_events {
            let _ = watchers.start(deps, folder, false);
        }
    }
    Ok(())
}

/// Sync every folder that is `pending`, or whose `last_synced_at` predates
/// `max(cadence_minutes * 60s, default_stale_minutes * 60s)` (spec.md §4.9
/// step 6). Runs folders concurrently; each folder's own ownership claim
/// in [`crate::state::EngineState`] still serializes duplicate triggers.
pub async fn sync_stale_folders(deps: &Deps) -> Result<usize> {
    let folders = deps.ledger.get_all_folders()?;
    let now = now_millis();
    let mut set = JoinSet::new();

    for folder in folders {
        if deps.state.is_syncing(folder.folder_id) {
            continue;
        }
        if !mode::trigger_allowed(&folder, SyncTrigger::Scheduled) {
            continue;
        }
        let stale_ms =
            (folder.sync_cadence_minutes as i64 * 60_000).max(deps.config.default_stale_minutes * 60_000);
        let is_stale = folder.status == FolderStatus::Pending
            || folder.last_synced_at.map(|t| now - t >= stale_ms).unwrap_or(true);
        if !is_stale {
            continue;
        }

        let deps = deps.clone();
        let folder_id = folder.folder_id;
        set.spawn(async move { sync_folder(&deps, folder_id, None, false, SyncTrigger::Scheduled).await });
    }

    let mut synced = 0usize;
    while let Some(joined) = set.join_next().await {
        if matches!(joined, Ok(Ok(_))) {
            synced += 1;
        }
    }
    Ok(synced)
}

/// Flip all `syncing`/`pending` rows not actively owned to `synced` (or
/// `paused` if unsafe), regardless of age (spec.md §4.9 "Also exposes
/// `force_cleanup_stuck_folders`").
pub async fn force_cleanup_stuck_folders(deps: &Deps) -> Result<usize> {
    let mut affected = 0usize;
    for status in [FolderStatus::Syncing, FolderStatus::Pending] {
        for folder in deps.ledger.get_folders_by_status(status)? {
            if deps.state.is_syncing(folder.folder_id) {
                continue;
            }
            let (new_status, message) = match path_safety::check(Path::new(&folder.folder_path)) {
                path_safety::Verdict::Unsafe(msg) => (FolderStatus::Paused, Some(msg)),
                path_safety::Verdict::Safe => (FolderStatus::Synced, None),
            };
            deps.ledger.set_status(folder.folder_id, new_status, message.as_deref())?;
            affected += 1;
        }
    }
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{LocalLexicalEmbeddingProvider, PlainTextDocumentParser};
    use crate::config::EngineConfig;
    use crate::events::EventBus;
    use crate::state::EngineState;
    use folderindex_core::{ChunkPreset, FolderRecord, IndexingMode, LastRunMetadata, ReindexPolicy, SyncMode};
    use folderindex_store::{Ledger, VectorStore};
    use std::collections::{HashMap, HashSet};
    use uuid::Uuid;

    fn make_deps(base: &std::path::Path) -> Deps {
        Deps {
            ledger: Arc::new(Ledger::open_in_memory().unwrap()),
            vector_store: Arc::new(VectorStore::new(base.join("vectors")).unwrap()),
            state: Arc::new(EngineState::new()),
            settings: Arc::new(EngineConfig::default()),
            embedding: Arc::new(LocalLexicalEmbeddingProvider::default()),
            parser: Arc::new(PlainTextDocumentParser),
            events: EventBus::new(),
            config: EngineConfig::default(),
        }
    }

    fn make_stuck_folder(path: &str, updated_at: i64) -> FolderRecord {
        FolderRecord {
            folder_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            folder_path: path.to_string(),
            recursive: true,
            include_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            file_type_filters: HashSet::new(),
            max_file_size_bytes: 10_000_000,
            chunk_preset: ChunkPreset::Balanced,
            chunk_size_override: None,
            chunk_overlap_override: None,
            indexing_mode: IndexingMode::Full,
            sync_mode: SyncMode::Manual,
            sync_cadence_minutes: 15,
            reindex_policy: ReindexPolicy::Never,
            status: FolderStatus::Syncing,
            last_error: None,
            last_synced_at: None,
            updated_at,
            file_count: 0,
            chunk_count: 0,
            skip_reasons: HashMap::new(),
            last_run_metadata: LastRunMetadata::default(),
            embedding_model: None,
            is_primary: true,
        }
    }

    #[tokio::test]
    async fn recovery_flips_stale_syncing_folder_to_error_when_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = make_deps(tmp.path());
        let folder = make_stuck_folder(tmp.path().join("proj").to_str().unwrap(), 0);
        deps.ledger.insert_folder(&folder).unwrap();

        let recovered = recover_stuck_syncing_folders(&deps).await.unwrap();
        assert_eq!(recovered, 1);
        let stored = deps.ledger.get_folder(folder.folder_id).unwrap().unwrap();
        assert_eq!(stored.status, FolderStatus::Error);
    }

    #[tokio::test]
    async fn recovery_leaves_recently_updated_folders_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = make_deps(tmp.path());
        let folder = make_stuck_folder(tmp.path().join("proj").to_str().unwrap(), now_millis());
        deps.ledger.insert_folder(&folder).unwrap();

        let recovered = recover_stuck_syncing_folders(&deps).await.unwrap();
        assert_eq!(recovered, 0);
    }

    #[tokio::test]
    async fn force_cleanup_clears_stuck_rows_regardless_of_age() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = make_deps(tmp.path());
        let folder = make_stuck_folder(tmp.path().join("proj").to_str().unwrap(), now_millis());
        deps.ledger.insert_folder(&folder).unwrap();

        let affected = force_cleanup_stuck_folders(&deps).await.unwrap();
        assert_eq!(affected, 1);
        let stored = deps.ledger.get_folder(folder.folder_id).unwrap().unwrap();
        assert_eq!(stored.status, FolderStatus::Synced);
    }
}
