//! `sync_folder`: the per-folder sync algorithm (spec.md §4.7).

use crate::deps::Deps;
use crate::error::{Error, Result};
use crate::mode::{self, ResolvedBehavior};
use crate::pipeline::{self, FileOutcome};
use crate::state::CancelHandle;
use folderindex_core::discovery::{discover, DiscoveryConfig};
use folderindex_core::{path_safety, now_millis, FolderStatus, SyncTrigger};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

const REMOTE_CONCURRENCY: usize = 5;
const LOCAL_CONCURRENCY: usize = 2;
const STAGGER_MS: u64 = 100;
const PROGRESS_FLUSH_INTERVAL: Duration = Duration::from_millis(500);
/// Above this many discovered files on Linux, the watcher starts in
/// polling mode rather than the native recursive backend (spec.md §4.7
/// step 10).
const LINUX_POLLING_THRESHOLD: usize = 500;

/// What the caller (the engine facade, once written) should do with the
/// folder's watcher after this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherDecision {
    Start { polling: bool },
    Stop,
    NoChange,
}

#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub files_processed: usize,
    pub files_indexed: usize,
    pub files_removed: usize,
    pub files_failed: usize,
    pub skip_reasons: HashMap<String, usize>,
    pub final_status: Option<FolderStatus>,
}

pub struct SyncOutcome {
    pub summary: SyncSummary,
    pub watcher_decision: WatcherDecision,
}

fn trigger_str(trigger: SyncTrigger) -> &'static str {
    match trigger {
        SyncTrigger::Manual => "manual",
        SyncTrigger::Auto => "auto",
        SyncTrigger::Triggered => "triggered",
        SyncTrigger::Scheduled => "scheduled",
    }
}

/// Claim exclusive ownership of `folder_id`'s run, evicting a conflicting
/// run on the same normalized path first (spec.md §4.7 step 3).
async fn claim_ownership(deps: &Deps, folder_id: Uuid, path: &str) -> Result<CancelHandle> {
    loop {
        let stolen = {
            let _guard = deps.state.ownership_lock.lock().await;
            if deps.state.syncing_folders.contains(&folder_id) {
                return Err(Error::AlreadySyncing(folder_id));
            }
            match deps.state.syncing_paths.get(path) {
                Some(entry) if entry.0 != folder_id => {
                    entry.1.cancel();
                    true
                }
                _ => {
                    let handle = CancelHandle::new();
                    deps.state.syncing_folders.insert(folder_id);
                    deps.state.syncing_paths.insert(path.to_string(), (folder_id, handle.clone()));
                    return Ok(handle);
                }
            }
        };
        if stolen {
            tokio::time::sleep(Duration::from_millis(50)).await;
            continue;
        }
    }
}

fn release_ownership(deps: &Deps, folder_id: Uuid, path: &str) {
    deps.state.syncing_folders.remove(&folder_id);
    if let Some(entry) = deps.state.syncing_paths.get(path) {
        if entry.0 == folder_id {
            drop(entry);
            deps.state.syncing_paths.remove(path);
        }
    }
}

pub async fn sync_folder(
    deps: &Deps,
    folder_id: Uuid,
    parallel: Option<usize>,
    force: bool,
    trigger: SyncTrigger,
) -> Result<SyncOutcome> {
    let mut folder = deps.ledger.get_folder(folder_id)?.ok_or(Error::FolderNotFound(folder_id))?;

    if let path_safety::Verdict::Unsafe(message) = path_safety::check(Path::new(&folder.folder_path))
    {
        deps.ledger.set_status(folder_id, FolderStatus::Paused, Some(&message))?;
        return Ok(SyncOutcome {
            summary: SyncSummary { final_status: Some(FolderStatus::Paused), ..Default::default() },
            watcher_decision: WatcherDecision::Stop,
        });
    }

    let behavior = mode::resolve(&folder, deps.settings.vector_db_enabled());
    if !mode::trigger_allowed(&folder, trigger) {
        return Err(Error::TriggerNotAllowed { folder_id, trigger: trigger_str(trigger) });
    }

    let effective_force = force || mode::smart_reindex_should_force(&folder, trigger, now_millis());

    let cancel = claim_ownership(deps, folder_id, &folder.folder_path).await?;
    let started_at = Instant::now();

    deps.ledger.set_status(folder_id, FolderStatus::Syncing, None)?;
    deps.ledger.update_progress(folder_id, 0, 0)?;

    let result =
        run_sync_body(deps, &mut folder, &behavior, effective_force, trigger, &cancel, started_at)
            .await;

    release_ownership(deps, folder_id, &folder.folder_path);
    result
}

async fn run_sync_body(
    deps: &Deps,
    folder: &mut folderindex_core::FolderRecord,
    behavior: &ResolvedBehavior,
    force: bool,
    trigger: SyncTrigger,
    cancel: &CancelHandle,
    started_at: Instant,
) -> Result<SyncOutcome> {
    let folder_id = folder.folder_id;

    let extensions = folder.effective_extensions().clone();
    let discovery_config = DiscoveryConfig {
        root: Path::new(&folder.folder_path),
        recursive: folder.recursive,
        exclude_patterns: &folder.exclude_patterns,
        extensions: &extensions,
    };
    let discovered = discover(&discovery_config);
    let discovered_count = discovered.len();

    let existing_files = deps.ledger.get_files_for_folder(folder_id)?;
    let pre_existing_count = existing_files.len();
    let discovered_paths: HashSet<String> =
        discovered.iter().map(|f| f.abs_path.to_string_lossy().to_string()).collect();

    let mut summary = SyncSummary::default();
    for stale in existing_files.iter().filter(|f| !discovered_paths.contains(&f.file_path)) {
        if !stale.vector_point_ids.is_empty() {
            let _ = deps.vector_store.delete_by_ids(folder.agent_id, &stale.vector_point_ids);
        }
        deps.ledger.delete_file_by_path(folder_id, &stale.file_path)?;
        summary.files_removed += 1;
    }

    let concurrency = if deps.embedding.is_local() { LOCAL_CONCURRENCY } else { REMOTE_CONCURRENCY };

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut join_set: JoinSet<FileOutcome> = JoinSet::new();
    for (idx, file) in discovered.into_iter().enumerate() {
        let deps = deps.clone();
        let folder_clone = folder.clone();
        let behavior = *behavior;
        let cancel = cancel.clone();
        let semaphore = semaphore.clone();
        let stagger = Duration::from_millis(STAGGER_MS * (idx % concurrency) as u64);
        join_set.spawn(async move {
            if !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
            let _permit = semaphore.acquire_owned().await;
            pipeline::process_file(
                &deps,
                &folder_clone,
                &behavior,
                &file.abs_path,
                &file.relative_path,
                force,
                &cancel,
            )
            .await
        });
    }

    let mut last_flush = Instant::now();
    while let Some(joined) = join_set.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => FileOutcome::Failed(format!("task panicked: {e}")),
        };
        summary.files_processed += 1;
        match outcome {
            FileOutcome::Indexed { .. } | FileOutcome::FilesOnlyIndexed => {
                summary.files_indexed += 1;
            }
            FileOutcome::Skipped(reason) => {
                *summary.skip_reasons.entry(reason.as_str().to_string()).or_insert(0) += 1;
            }
            FileOutcome::Failed(_) => {
                summary.files_failed += 1;
            }
        }

        if last_flush.elapsed() >= PROGRESS_FLUSH_INTERVAL {
            let (file_count, chunk_count) = deps.ledger.recompute_counts(folder_id)?;
            deps.ledger.update_progress(folder_id, file_count, chunk_count)?;
            last_flush = Instant::now();
        }
    }

    let (file_count, chunk_count) = deps.ledger.recompute_counts(folder_id)?;

    let final_status = if summary.files_indexed > 0 || pre_existing_count > 0 || file_count > 0 {
        FolderStatus::Synced
    } else if summary.files_failed > 0 {
        FolderStatus::Error
    } else {
        FolderStatus::Synced
    };
    summary.final_status = Some(final_status);

    let mut refreshed =
        deps.ledger.get_folder(folder_id)?.ok_or(Error::FolderNotFound(folder_id))?;
    refreshed.status = final_status;
    refreshed.last_error = None;
    refreshed.last_synced_at = Some(now_millis());
    refreshed.updated_at = now_millis();
    refreshed.file_count = file_count;
    refreshed.chunk_count = chunk_count;
    refreshed.skip_reasons = summary.skip_reasons.clone();
    refreshed.last_run_metadata.last_trigger = Some(trigger);
    refreshed.last_run_metadata.duration_ms = Some(started_at.elapsed().as_millis() as u64);
    refreshed.last_run_metadata.files_processed = Some(summary.files_processed);
    refreshed.last_run_metadata.files_indexed = Some(summary.files_indexed);
    refreshed.last_run_metadata.files_removed = Some(summary.files_removed);
    if force && trigger == SyncTrigger::Scheduled {
        refreshed.last_run_metadata.smart_reindex_at = Some(now_millis());
    }
    deps.ledger.update_folder(&refreshed)?;
    *folder = refreshed;

    let watcher_decision = if behavior.allows_watcher_events && final_status == FolderStatus::Synced
    {
        WatcherDecision::Start { polling: cfg!(target_os = "linux") && discovered_count > LINUX_POLLING_THRESHOLD }
    } else if !behavior.allows_watcher_events {
        WatcherDecision::Stop
    } else {
        WatcherDecision::NoChange
    };

    Ok(SyncOutcome { summary, watcher_decision })
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
    use std::collections::{HashMap as StdHashMap, HashSet as StdHashSet};

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

    fn make_folder(path: &str) -> FolderRecord {
        FolderRecord {
            folder_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            folder_path: path.to_string(),
            recursive: true,
            include_extensions: StdHashSet::new(),
            exclude_patterns: Vec::new(),
            file_type_filters: StdHashSet::new(),
            max_file_size_bytes: 10_000_000,
            chunk_preset: ChunkPreset::Balanced,
            chunk_size_override: None,
            chunk_overlap_override: None,
            indexing_mode: IndexingMode::Full,
            sync_mode: SyncMode::Manual,
            sync_cadence_minutes: 15,
            reindex_policy: ReindexPolicy::Smart,
            status: FolderStatus::Pending,
            last_error: None,
            last_synced_at: None,
            updated_at: now_millis(),
            file_count: 0,
            chunk_count: 0,
            skip_reasons: StdHashMap::new(),
            last_run_metadata: LastRunMetadata::default(),
            embedding_model: None,
            is_primary: true,
        }
    }

    #[tokio::test]
    async fn sync_folder_indexes_discovered_files() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("proj");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("a.md"), "hello world").unwrap();

        let deps = make_deps(tmp.path());
        let folder = make_folder(project.to_str().unwrap());
        deps.ledger.insert_folder(&folder).unwrap();

        let outcome = sync_folder(&deps, folder.folder_id, None, false, SyncTrigger::Manual)
            .await
            .unwrap();
        assert_eq!(outcome.summary.files_indexed, 1);
        assert_eq!(outcome.summary.final_status, Some(FolderStatus::Synced));

        let stored = deps.ledger.get_folder(folder.folder_id).unwrap().unwrap();
        assert_eq!(stored.status, FolderStatus::Synced);
        assert_eq!(stored.file_count, 1);
    }

    #[tokio::test]
    async fn unsafe_path_pauses_without_indexing() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = make_deps(tmp.path());
        let folder = make_folder("/etc");
        deps.ledger.insert_folder(&folder).unwrap();

        let outcome = sync_folder(&deps, folder.folder_id, None, false, SyncTrigger::Manual)
            .await
            .unwrap();
        assert_eq!(outcome.summary.final_status, Some(FolderStatus::Paused));
        let stored = deps.ledger.get_folder(folder.folder_id).unwrap().unwrap();
        assert_eq!(stored.status, FolderStatus::Paused);
    }

    #[tokio::test]
    async fn disallowed_trigger_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let deps = make_deps(tmp.path());
        let mut folder = make_folder(tmp.path().join("proj").to_str().unwrap());
        folder.sync_mode = SyncMode::Manual;
        deps.ledger.insert_folder(&folder).unwrap();

        let result = sync_folder(&deps, folder.folder_id, None, false, SyncTrigger::Scheduled).await;
        assert!(matches!(result, Err(Error::TriggerNotAllowed { .. })));
    }

    #[tokio::test]
    async fn unchanged_file_is_skipped_on_second_run() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("proj");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("a.md"), "hello world").unwrap();

        let deps = make_deps(tmp.path());
        let folder = make_folder(project.to_str().unwrap());
        deps.ledger.insert_folder(&folder).unwrap();

        sync_folder(&deps, folder.folder_id, None, false, SyncTrigger::Manual).await.unwrap();
        let second = sync_folder(&deps, folder.folder_id, None, false, SyncTrigger::Manual)
            .await
            .unwrap();
        assert_eq!(second.summary.skip_reasons.get("unchanged"), Some(&1));
    }

    #[tokio::test]
    async fn deleted_file_is_removed_from_ledger() {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("proj");
        std::fs::create_dir_all(&project).unwrap();
        let file_path = project.join("a.md");
        std::fs::write(&file_path, "hello world").unwrap();

        let deps = make_deps(tmp.path());
        let folder = make_folder(project.to_str().unwrap());
        deps.ledger.insert_folder(&folder).unwrap();
        sync_folder(&deps, folder.folder_id, None, false, SyncTrigger::Manual).await.unwrap();

        std::fs::remove_file(&file_path).unwrap();
        let outcome = sync_folder(&deps, folder.folder_id, None, false, SyncTrigger::Manual)
            .await
            .unwrap();
        assert_eq!(outcome.summary.files_removed, 1);
        assert_eq!(deps.ledger.get_files_for_folder(folder.folder_id).unwrap().len(), 0);
    }
}
