//! Folder Registry & File Ledger (spec.md §4.6).
//!
//! A single `rusqlite::Connection` behind a `Mutex`, following the
//! `Clemens865-superbrain-app` indexer's `Connection` + `params!` style.
//! Writes are already serialized per folder by the orchestrator (spec.md
//! §5), and `rusqlite::Connection` is `Send` but not `Sync`, so a mutex is
//! the natural — and sufficient — synchronization primitive here.

use crate::error::StoreError;
use crate::json_fields::{decode, encode};
use crate::schema::SCHEMA_SQL;
use folderindex_core::{
    now_millis, ChunkPreset, FileRecord, FileStatus, FolderRecord, FolderStatus, IndexingMode,
    LastRunMetadata, ReindexPolicy, SyncMode,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

/// Durable store for folder and file records.
pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    /// Open (creating if necessary) the ledger database at `path` and
    /// apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory ledger, used by tests and by the CLI's `--ephemeral` mode.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    // -----------------------------------------------------------------
    // Folder CRUD
    // -----------------------------------------------------------------

    /// Insert a new folder row. Returns `StoreError::DuplicateFolder` if
    /// `(agent_id, folder_path)` already exists (invariant I3).
    pub fn insert_folder(&self, folder: &FolderRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO folders (
                folder_id, agent_id, user_id, folder_path, recursive,
                include_extensions, exclude_patterns, file_type_filters,
                max_file_size_bytes, chunk_preset, chunk_size_override,
                chunk_overlap_override, indexing_mode, sync_mode,
                sync_cadence_minutes, reindex_policy, status, last_error,
                last_synced_at, updated_at, file_count, chunk_count,
                skip_reasons, last_run_metadata, embedding_model, is_primary
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26)",
            params![
                folder.folder_id.to_string(),
                folder.agent_id.to_string(),
                folder.user_id.to_string(),
                folder.folder_path,
                folder.recursive,
                encode(&folder.include_extensions),
                encode(&folder.exclude_patterns),
                encode(&folder.file_type_filters),
                folder.max_file_size_bytes,
                chunk_preset_str(folder.chunk_preset),
                folder.chunk_size_override,
                folder.chunk_overlap_override,
                indexing_mode_str(folder.indexing_mode),
                sync_mode_str(folder.sync_mode),
                folder.sync_cadence_minutes,
                reindex_policy_str(folder.reindex_policy),
                folder.status.as_str(),
                folder.last_error,
                folder.last_synced_at,
                folder.updated_at,
                folder.file_count as i64,
                folder.chunk_count as i64,
                encode(&folder.skip_reasons),
                encode(&folder.last_run_metadata),
                folder.embedding_model,
                folder.is_primary,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateFolder(folder.folder_path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist every mutable field of `folder` (full-row update).
    pub fn update_folder(&self, folder: &FolderRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE folders SET
                recursive=?2, include_extensions=?3, exclude_patterns=?4,
                file_type_filters=?5, max_file_size_bytes=?6, chunk_preset=?7,
                chunk_size_override=?8, chunk_overlap_override=?9,
                indexing_mode=?10, sync_mode=?11, sync_cadence_minutes=?12,
                reindex_policy=?13, status=?14, last_error=?15,
                last_synced_at=?16, updated_at=?17, file_count=?18,
                chunk_count=?19, skip_reasons=?20, last_run_metadata=?21,
                embedding_model=?22, is_primary=?23
             WHERE folder_id = ?1",
            params![
                folder.folder_id.to_string(),
                folder.recursive,
                encode(&folder.include_extensions),
                encode(&folder.exclude_patterns),
                encode(&folder.file_type_filters),
                folder.max_file_size_bytes,
                chunk_preset_str(folder.chunk_preset),
                folder.chunk_size_override,
                folder.chunk_overlap_override,
                indexing_mode_str(folder.indexing_mode),
                sync_mode_str(folder.sync_mode),
                folder.sync_cadence_minutes,
                reindex_policy_str(folder.reindex_policy),
                folder.status.as_str(),
                folder.last_error,
                folder.last_synced_at,
                folder.updated_at,
                folder.file_count as i64,
                folder.chunk_count as i64,
                encode(&folder.skip_reasons),
                encode(&folder.last_run_metadata),
                folder.embedding_model,
                folder.is_primary,
            ],
        )?;
        Ok(())
    }

    /// Update only `status`/`last_error`/`updated_at` — the common path
    /// used by the orchestrator when transitioning a folder's lifecycle
    /// state without touching its configuration.
    pub fn set_status(
        &self,
        folder_id: Uuid,
        status: FolderStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE folders SET status=?2, last_error=?3, updated_at=?4 WHERE folder_id=?1",
            params![folder_id.to_string(), status.as_str(), last_error, now_millis()],
        )?;
        Ok(())
    }

    /// Flush live progress counters without altering status (spec.md
    /// §4.7 step 8h).
    pub fn update_progress(
        &self,
        folder_id: Uuid,
        file_count: usize,
        chunk_count: usize,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE folders SET file_count=?2, chunk_count=?3, updated_at=?4 WHERE folder_id=?1",
            params![folder_id.to_string(), file_count as i64, chunk_count as i64, now_millis()],
        )?;
        Ok(())
    }

    pub fn get_folder(&self, folder_id: Uuid) -> Result<Option<FolderRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM folders WHERE folder_id = ?1",
            params![folder_id.to_string()],
            row_to_folder,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_folders_for_agent(&self, agent_id: Uuid) -> Result<Vec<FolderRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM folders WHERE agent_id = ?1 ORDER BY updated_at ASC",
        )?;
        let rows = stmt.query_map(params![agent_id.to_string()], row_to_folder)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_all_folders(&self) -> Result<Vec<FolderRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM folders ORDER BY updated_at ASC")?;
        let rows = stmt.query_map([], row_to_folder)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All folders in a given status, oldest `updated_at` first — used by
    /// the background scheduler (spec.md §4.9) to find stale/pending work.
    pub fn get_folders_by_status(
        &self,
        status: FolderStatus,
    ) -> Result<Vec<FolderRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM folders WHERE status = ?1 ORDER BY updated_at ASC")?;
        let rows = stmt.query_map(params![status.as_str()], row_to_folder)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a folder row (file rows cascade via the foreign key).
    pub fn delete_folder(&self, folder_id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM folders WHERE folder_id = ?1", params![folder_id.to_string()])?;
        Ok(())
    }

    /// Transactionally clear `is_primary` for every folder of `agent_id`
    /// and set it on `folder_id` (invariant I1).
    pub fn set_primary(&self, folder_id: Uuid, agent_id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE folders SET is_primary = 0 WHERE agent_id = ?1",
            params![agent_id.to_string()],
        )?;
        tx.execute(
            "UPDATE folders SET is_primary = 1 WHERE folder_id = ?1 AND agent_id = ?2",
            params![folder_id.to_string(), agent_id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Oldest folder for an agent (by `updated_at`), used to promote a new
    /// primary after the current one is removed (spec.md §4.7
    /// `remove_folder`).
    pub fn oldest_folder_for_agent(
        &self,
        agent_id: Uuid,
    ) -> Result<Option<FolderRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM folders WHERE agent_id = ?1 ORDER BY updated_at ASC LIMIT 1",
            params![agent_id.to_string()],
            row_to_folder,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn count_folders_for_agent(&self, agent_id: Uuid) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM folders WHERE agent_id = ?1",
            params![agent_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // -----------------------------------------------------------------
    // File CRUD
    // -----------------------------------------------------------------

    /// Insert or replace a file row, keyed by `(folder_id, file_path)`
    /// (invariant F1).
    pub fn upsert_file(&self, file: &FileRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO files (
                file_id, folder_id, agent_id, file_path, relative_path,
                content_hash, size_bytes, modified_at, chunk_count,
                vector_point_ids, status, last_indexed_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
             ON CONFLICT(folder_id, file_path) DO UPDATE SET
                content_hash=excluded.content_hash,
                size_bytes=excluded.size_bytes,
                modified_at=excluded.modified_at,
                chunk_count=excluded.chunk_count,
                vector_point_ids=excluded.vector_point_ids,
                status=excluded.status,
                last_indexed_at=excluded.last_indexed_at",
            params![
                file.file_id.to_string(),
                file.folder_id.to_string(),
                file.agent_id.to_string(),
                file.file_path,
                file.relative_path,
                file.content_hash,
                file.size_bytes,
                file.modified_at,
                file.chunk_count as i64,
                encode(&file.vector_point_ids),
                file.status.as_str(),
                file.last_indexed_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_file_by_path(
        &self,
        folder_id: Uuid,
        file_path: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM files WHERE folder_id = ?1 AND file_path = ?2",
            params![folder_id.to_string(), file_path],
            row_to_file,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_files_for_folder(&self, folder_id: Uuid) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM files WHERE folder_id = ?1")?;
        let rows = stmt.query_map(params![folder_id.to_string()], row_to_file)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a file row by path, returning the removed record (if any) so
    /// the caller can clean up its `vector_point_ids` in the vector store
    /// first (spec.md §4.7 step 6, F2).
    pub fn delete_file_by_path(
        &self,
        folder_id: Uuid,
        file_path: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        let existing = self.get_file_by_path(folder_id, file_path)?;
        if existing.is_some() {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "DELETE FROM files WHERE folder_id = ?1 AND file_path = ?2",
                params![folder_id.to_string(), file_path],
            )?;
        }
        Ok(existing)
    }

    pub fn delete_files_for_folder(&self, folder_id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM files WHERE folder_id = ?1", params![folder_id.to_string()])?;
        Ok(())
    }

    /// Sum `chunk_count` and count rows for a folder — the recomputation
    /// spec.md §4.7 step 9 performs after the concurrency limiter drains.
    pub fn recompute_counts(&self, folder_id: Uuid) -> Result<(usize, usize), StoreError> {
        let conn = self.conn.lock().unwrap();
        let (file_count, chunk_count): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), SUM(chunk_count) FROM files WHERE folder_id = ?1",
            params![folder_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((file_count as usize, chunk_count.unwrap_or(0) as usize))
    }
}

fn chunk_preset_str(p: ChunkPreset) -> &'static str {
    match p {
        ChunkPreset::Balanced => "balanced",
        ChunkPreset::Small => "small",
        ChunkPreset::Large => "large",
        ChunkPreset::Custom => "custom",
    }
}

fn parse_chunk_preset(s: &str) -> ChunkPreset {
    match s {
        "small" => ChunkPreset::Small,
        "large" => ChunkPreset::Large,
        "custom" => ChunkPreset::Custom,
        _ => ChunkPreset::Balanced,
    }
}

fn indexing_mode_str(m: IndexingMode) -> &'static str {
    match m {
        IndexingMode::FilesOnly => "files-only",
        IndexingMode::Full => "full",
        IndexingMode::Auto => "auto",
    }
}

fn parse_indexing_mode(s: &str) -> IndexingMode {
    match s {
        "full" => IndexingMode::Full,
        "files-only" => IndexingMode::FilesOnly,
        _ => IndexingMode::Auto,
    }
}

fn sync_mode_str(m: SyncMode) -> &'static str {
    match m {
        SyncMode::Auto => "auto",
        SyncMode::Manual => "manual",
        SyncMode::Scheduled => "scheduled",
        SyncMode::Triggered => "triggered",
    }
}

fn parse_sync_mode(s: &str) -> SyncMode {
    match s {
        "manual" => SyncMode::Manual,
        "scheduled" => SyncMode::Scheduled,
        "triggered" => SyncMode::Triggered,
        _ => SyncMode::Auto,
    }
}

fn reindex_policy_str(p: ReindexPolicy) -> &'static str {
    match p {
        ReindexPolicy::Smart => "smart",
        ReindexPolicy::Always => "always",
        ReindexPolicy::Never => "never",
    }
}

fn parse_reindex_policy(s: &str) -> ReindexPolicy {
    match s {
        "always" => ReindexPolicy::Always,
        "never" => ReindexPolicy::Never,
        _ => ReindexPolicy::Smart,
    }
}

fn row_to_folder(row: &rusqlite::Row) -> rusqlite::Result<FolderRecord> {
    let folder_id: String = row.get("folder_id")?;
    let agent_id: String = row.get("agent_id")?;
    let user_id: String = row.get("user_id")?;
    let chunk_preset: String = row.get("chunk_preset")?;
    let indexing_mode: String = row.get("indexing_mode")?;
    let sync_mode: String = row.get("sync_mode")?;
    let reindex_policy: String = row.get("reindex_policy")?;
    let status: String = row.get("status")?;
    let include_extensions: String = row.get("include_extensions")?;
    let exclude_patterns: String = row.get("exclude_patterns")?;
    let file_type_filters: String = row.get("file_type_filters")?;
    let skip_reasons: String = row.get("skip_reasons")?;
    let last_run_metadata: String = row.get("last_run_metadata")?;

    Ok(FolderRecord {
        folder_id: Uuid::parse_str(&folder_id).unwrap_or_default(),
        agent_id: Uuid::parse_str(&agent_id).unwrap_or_default(),
        user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
        folder_path: row.get("folder_path")?,
        recursive: row.get("recursive")?,
        include_extensions: decode(&include_extensions),
        exclude_patterns: decode(&exclude_patterns),
        file_type_filters: decode(&file_type_filters),
        max_file_size_bytes: row.get::<_, i64>("max_file_size_bytes")? as u64,
        chunk_preset: parse_chunk_preset(&chunk_preset),
        chunk_size_override: row.get::<_, Option<i64>>("chunk_size_override")?.map(|v| v as usize),
        chunk_overlap_override: row
            .get::<_, Option<i64>>("chunk_overlap_override")?
            .map(|v| v as usize),
        indexing_mode: parse_indexing_mode(&indexing_mode),
        sync_mode: parse_sync_mode(&sync_mode),
        sync_cadence_minutes: row.get::<_, i64>("sync_cadence_minutes")? as u32,
        reindex_policy: parse_reindex_policy(&reindex_policy),
        status: FolderStatus::parse(&status).unwrap_or(FolderStatus::Error),
        last_error: row.get("last_error")?,
        last_synced_at: row.get("last_synced_at")?,
        updated_at: row.get("updated_at")?,
        file_count: row.get::<_, i64>("file_count")? as usize,
        chunk_count: row.get::<_, i64>("chunk_count")? as usize,
        skip_reasons: decode(&skip_reasons),
        last_run_metadata: decode::<LastRunMetadata>(&last_run_metadata),
        embedding_model: row.get("embedding_model")?,
        is_primary: row.get("is_primary")?,
    })
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    let file_id: String = row.get("file_id")?;
    let folder_id: String = row.get("folder_id")?;
    let agent_id: String = row.get("agent_id")?;
    let status: String = row.get("status")?;
    let vector_point_ids: String = row.get("vector_point_ids")?;

    Ok(FileRecord {
        file_id: Uuid::parse_str(&file_id).unwrap_or_default(),
        folder_id: Uuid::parse_str(&folder_id).unwrap_or_default(),
        agent_id: Uuid::parse_str(&agent_id).unwrap_or_default(),
        file_path: row.get("file_path")?,
        relative_path: row.get("relative_path")?,
        content_hash: row.get("content_hash")?,
        size_bytes: row.get::<_, i64>("size_bytes")? as u64,
        modified_at: row.get("modified_at")?,
        chunk_count: row.get::<_, i64>("chunk_count")? as usize,
        vector_point_ids: decode(&vector_point_ids),
        status: FileStatus::parse(&status).unwrap_or(FileStatus::Failed),
        last_indexed_at: row.get("last_indexed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use folderindex_core::*;
    use std::collections::{HashMap, HashSet};

    fn sample_folder(agent_id: Uuid, path: &str, primary: bool) -> FolderRecord {
        FolderRecord {
            folder_id: Uuid::new_v4(),
            agent_id,
            user_id: Uuid::new_v4(),
            folder_path: path.to_string(),
            recursive: true,
            include_extensions: HashSet::from(["rs".to_string()]),
            exclude_patterns: vec!["target".to_string()],
            file_type_filters: HashSet::new(),
            max_file_size_bytes: 1_000_000,
            chunk_preset: ChunkPreset::Balanced,
            chunk_size_override: None,
            chunk_overlap_override: None,
            indexing_mode: IndexingMode::Auto,
            sync_mode: SyncMode::Auto,
            sync_cadence_minutes: 15,
            reindex_policy: ReindexPolicy::Smart,
            status: FolderStatus::Pending,
            last_error: None,
            last_synced_at: None,
            updated_at: now_millis(),
            file_count: 0,
            chunk_count: 0,
            skip_reasons: HashMap::new(),
            last_run_metadata: LastRunMetadata::default(),
            embedding_model: None,
            is_primary: primary,
        }
    }

    #[test]
    fn insert_and_get_folder_round_trips() {
        let ledger = Ledger::open_in_memory().unwrap();
        let agent = Uuid::new_v4();
        let folder = sample_folder(agent, "/tmp/proj", true);
        ledger.insert_folder(&folder).unwrap();

        let fetched = ledger.get_folder(folder.folder_id).unwrap().unwrap();
        assert_eq!(fetched.folder_path, "/tmp/proj");
        assert_eq!(fetched.include_extensions, folder.include_extensions);
        assert!(fetched.is_primary);
    }

    #[test]
    fn duplicate_agent_path_is_rejected() {
        let ledger = Ledger::open_in_memory().unwrap();
        let agent = Uuid::new_v4();
        let a = sample_folder(agent, "/tmp/proj", true);
        let b = sample_folder(agent, "/tmp/proj", false);
        ledger.insert_folder(&a).unwrap();
        let err = ledger.insert_folder(&b).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateFolder(_)));
    }

    #[test]
    fn set_primary_clears_other_folders() {
        let ledger = Ledger::open_in_memory().unwrap();
        let agent = Uuid::new_v4();
        let a = sample_folder(agent, "/tmp/a", true);
        let b = sample_folder(agent, "/tmp/b", false);
        ledger.insert_folder(&a).unwrap();
        ledger.insert_folder(&b).unwrap();

        ledger.set_primary(b.folder_id, agent).unwrap();

        let a2 = ledger.get_folder(a.folder_id).unwrap().unwrap();
        let b2 = ledger.get_folder(b.folder_id).unwrap().unwrap();
        assert!(!a2.is_primary);
        assert!(b2.is_primary);
    }

    #[test]
    fn delete_folder_cascades_files() {
        let ledger = Ledger::open_in_memory().unwrap();
        let agent = Uuid::new_v4();
        let folder = sample_folder(agent, "/tmp/proj", true);
        ledger.insert_folder(&folder).unwrap();

        let file = FileRecord {
            file_id: Uuid::new_v4(),
            folder_id: folder.folder_id,
            agent_id: agent,
            file_path: "/tmp/proj/a.rs".into(),
            relative_path: "a.rs".into(),
            content_hash: "abc".into(),
            size_bytes: 10,
            modified_at: now_millis(),
            chunk_count: 1,
            vector_point_ids: vec![Uuid::new_v4()],
            status: FileStatus::Indexed,
            last_indexed_at: Some(now_millis()),
        };
        ledger.upsert_file(&file).unwrap();
        assert_eq!(ledger.get_files_for_folder(folder.folder_id).unwrap().len(), 1);

        ledger.delete_folder(folder.folder_id).unwrap();
        assert_eq!(ledger.get_files_for_folder(folder.folder_id).unwrap().len(), 0);
    }

    #[test]
    fn upsert_file_unchanged_hash_does_not_duplicate() {
        let ledger = Ledger::open_in_memory().unwrap();
        let agent = Uuid::new_v4();
        let folder = sample_folder(agent, "/tmp/proj", true);
        ledger.insert_folder(&folder).unwrap();

        let mut file = FileRecord {
            file_id: Uuid::new_v4(),
            folder_id: folder.folder_id,
            agent_id: agent,
            file_path: "/tmp/proj/a.rs".into(),
            relative_path: "a.rs".into(),
            content_hash: "abc".into(),
            size_bytes: 10,
            modified_at: now_millis(),
            chunk_count: 1,
            vector_point_ids: vec![Uuid::new_v4()],
            status: FileStatus::Indexed,
            last_indexed_at: Some(now_millis()),
        };
        ledger.upsert_file(&file).unwrap();
        file.content_hash = "def".into();
        file.chunk_count = 2;
        ledger.upsert_file(&file).unwrap();

        let files = ledger.get_files_for_folder(folder.folder_id).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content_hash, "def");
        assert_eq!(files[0].chunk_count, 2);
    }

    #[test]
    fn recompute_counts_sums_chunk_counts() {
        let ledger = Ledger::open_in_memory().unwrap();
        let agent = Uuid::new_v4();
        let folder = sample_folder(agent, "/tmp/proj", true);
        ledger.insert_folder(&folder).unwrap();

        for i in 0..3 {
            let file = FileRecord {
                file_id: Uuid::new_v4(),
                folder_id: folder.folder_id,
                agent_id: agent,
                file_path: format!("/tmp/proj/{i}.rs"),
                relative_path: format!("{i}.rs"),
                content_hash: "abc".into(),
                size_bytes: 10,
                modified_at: now_millis(),
                chunk_count: 2,
                vector_point_ids: vec![],
                status: FileStatus::Indexed,
                last_indexed_at: Some(now_millis()),
            };
            ledger.upsert_file(&file).unwrap();
        }

        let (file_count, chunk_count) = ledger.recompute_counts(folder.folder_id).unwrap();
        assert_eq!(file_count, 3);
        assert_eq!(chunk_count, 6);
    }
}
