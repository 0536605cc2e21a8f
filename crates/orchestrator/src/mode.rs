//! Sync mode resolution (spec.md §4.7 "Sync mode resolution").
//!
//! Resolved once at the start of a run and held for its duration — spec.md
//! §9 Open Question (a): the interaction between the global
//! `vector_db_enabled` flag and a folder's `indexing_mode=auto` is not
//! specified for settings that change mid-sync, so we fix the decision at
//! sync start and never re-read it within the same run. Watcher batches
//! (spec.md §4.8) re-resolve per batch, since each batch is its own
//! "start".

use folderindex_core::{ChunkPreset, FolderRecord, IndexingMode, SyncMode, SyncTrigger};

/// Everything a sync run needs to know about what it's allowed to do and
/// how to size chunks, computed once from a folder's config plus the
/// global vector-DB-enabled flag.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedBehavior {
    pub should_create_embeddings: bool,
    pub allows_watcher_events: bool,
    pub allows_scheduled_runs: bool,
    pub allows_automatic_add_sync: bool,
    pub max_file_size_bytes: u64,
    pub chunk_preset: ChunkPreset,
    pub chunk_size_override: Option<usize>,
    pub chunk_overlap_override: Option<usize>,
}

pub fn resolve(folder: &FolderRecord, vector_db_enabled: bool) -> ResolvedBehavior {
    let should_create_embeddings = match folder.indexing_mode {
        IndexingMode::Full => true,
        IndexingMode::FilesOnly => false,
        IndexingMode::Auto => vector_db_enabled,
    };

    ResolvedBehavior {
        should_create_embeddings,
        allows_watcher_events: matches!(folder.sync_mode, SyncMode::Auto | SyncMode::Triggered),
        allows_scheduled_runs: matches!(folder.sync_mode, SyncMode::Auto | SyncMode::Scheduled),
        allows_automatic_add_sync: matches!(folder.sync_mode, SyncMode::Auto),
        max_file_size_bytes: folder.max_file_size_bytes,
        chunk_preset: folder.chunk_preset,
        chunk_size_override: folder.chunk_size_override,
        chunk_overlap_override: folder.chunk_overlap_override,
    }
}

/// Whether `trigger` is permitted by `folder.sync_mode` (spec.md §4.7: "A
/// run started with trigger manual/auto/triggered/scheduled is rejected if
/// the mode does not authorize that trigger").
pub fn trigger_allowed(folder: &FolderRecord, trigger: SyncTrigger) -> bool {
    match trigger {
        SyncTrigger::Manual => true,
        SyncTrigger::Auto => matches!(folder.sync_mode, SyncMode::Auto),
        SyncTrigger::Triggered => {
            matches!(folder.sync_mode, SyncMode::Auto | SyncMode::Triggered)
        }
        SyncTrigger::Scheduled => {
            matches!(folder.sync_mode, SyncMode::Auto | SyncMode::Scheduled)
        }
    }
}

/// `smart` reindex: on `scheduled` runs, force a full reindex if the last
/// smart-reindex timestamp is >= 24h old (or has never run).
pub fn smart_reindex_should_force(
    folder: &FolderRecord,
    trigger: SyncTrigger,
    now_millis: i64,
) -> bool {
    use folderindex_core::ReindexPolicy;
    if folder.reindex_policy != ReindexPolicy::Smart || trigger != SyncTrigger::Scheduled {
        return false;
    }
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    match folder.last_run_metadata.smart_reindex_at {
        Some(last) => now_millis - last >= DAY_MS,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folderindex_core::*;
    use std::collections::{HashMap, HashSet};
    use uuid::Uuid;

    fn sample_folder(indexing_mode: IndexingMode, sync_mode: SyncMode) -> FolderRecord {
        FolderRecord {
            folder_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            folder_path: "/tmp/proj".into(),
            recursive: true,
            include_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            file_type_filters: HashSet::new(),
            max_file_size_bytes: 1_000_000,
            chunk_preset: ChunkPreset::Balanced,
            chunk_size_override: None,
            chunk_overlap_override: None,
            indexing_mode,
            sync_mode,
            sync_cadence_minutes: 15,
            reindex_policy: ReindexPolicy::Smart,
            status: FolderStatus::Pending,
            last_error: None,
            last_synced_at: None,
            updated_at: 0,
            file_count: 0,
            chunk_count: 0,
            skip_reasons: HashMap::new(),
            last_run_metadata: LastRunMetadata::default(),
            embedding_model: None,
            is_primary: true,
        }
    }

    #[test]
    fn auto_indexing_mode_follows_global_flag() {
        let folder = sample_folder(IndexingMode::Auto, SyncMode::Auto);
        assert!(resolve(&folder, true).should_create_embeddings);
        assert!(!resolve(&folder, false).should_create_embeddings);
    }

    #[test]
    fn files_only_never_embeds() {
        let folder = sample_folder(IndexingMode::FilesOnly, SyncMode::Auto);
        assert!(!resolve(&folder, true).should_create_embeddings);
    }

    #[test]
    fn manual_trigger_always_allowed() {
        let folder = sample_folder(IndexingMode::Full, SyncMode::Manual);
        assert!(trigger_allowed(&folder, SyncTrigger::Manual));
        assert!(!trigger_allowed(&folder, SyncTrigger::Scheduled));
    }

    #[test]
    fn scheduled_trigger_requires_auto_or_scheduled_mode() {
        let folder = sample_folder(IndexingMode::Full, SyncMode::Scheduled);
        assert!(trigger_allowed(&folder, SyncTrigger::Scheduled));
        assert!(!trigger_allowed(&folder, SyncTrigger::Triggered));
    }

    #[test]
    fn smart_reindex_forces_after_24h() {
        let mut folder = sample_folder(IndexingMode::Full, SyncMode::Scheduled);
        folder.last_run_metadata.smart_reindex_at = Some(0);
        let day_ms = 24 * 60 * 60 * 1000;
        assert!(smart_reindex_should_force(&folder, SyncTrigger::Scheduled, day_ms));
        assert!(!smart_reindex_should_force(&folder, SyncTrigger::Scheduled, day_ms - 1));
    }

    #[test]
    fn smart_reindex_never_forces_outside_scheduled_trigger() {
        let mut folder = sample_folder(IndexingMode::Full, SyncMode::Auto);
        folder.last_run_metadata.smart_reindex_at = None;
        assert!(!smart_reindex_should_force(&folder, SyncTrigger::Manual, 1_000_000));
    }
}
