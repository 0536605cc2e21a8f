//! Embedded columnar vector store (spec.md §4.5).
//!
//! One append-only record file per agent under the store's base directory,
//! mirrored into an in-memory `DashMap<Uuid, VectorRecord>` for search.
//! This generalizes the teacher's single global `semantic_search` index
//! (`server/src/semantic.rs`) into one independent table per agent, the
//! way `hivellm-vectorizer`'s manifest suggests splitting a vector index
//! per collection rather than sharing one.

use crate::error::StoreError;
use dashmap::DashMap;
use folderindex_core::VectorRecord;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct SchemaSentinel {
    __schema__: bool,
    dim: usize,
    hybrid: bool,
}

struct AgentTable {
    dim: usize,
    hybrid: bool,
    records: DashMap<Uuid, VectorRecord>,
}

/// A single scored hit returned from `search`.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: VectorRecord,
    pub score: f32,
}

/// Search request options (spec.md §4.5 "Query").
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub top_k: usize,
    pub folder_id: Option<Uuid>,
    /// Hashed bag-of-words query vector (spec.md §4.4); ignored unless the
    /// table is hybrid.
    pub lexical_query: Option<Vec<f32>>,
    /// Weight given to the lexical score in `[0.0, 1.0]` when hybrid.
    pub lexical_weight: f32,
}

/// Adapter over the per-agent columnar vector tables.
pub struct VectorStore {
    base_dir: PathBuf,
    tables: DashMap<Uuid, Arc<AgentTable>>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl VectorStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir, tables: DashMap::new(), locks: DashMap::new() })
    }

    fn table_path(&self, agent_id: Uuid) -> PathBuf {
        self.base_dir.join(format!("{agent_id}.vecs.jsonl"))
    }

    fn lock_for(&self, agent_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(agent_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Ensure a table exists for `agent_id` with the requested shape,
    /// loading it from disk if present. If an existing table lacks
    /// lexical vectors but hybrid mode is now requested, the table is
    /// dropped and recreated (spec.md §4.5 "schema migration").
    ///
    /// Single-flight per agent: concurrent callers serialize on the same
    /// `Mutex` rather than racing to create the file twice.
    pub fn ensure_table(&self, agent_id: Uuid, dim: usize, hybrid: bool) -> Result<(), StoreError> {
        let lock = self.lock_for(agent_id);
        let _guard = lock.lock().unwrap();

        if let Some(existing) = self.tables.get(&agent_id) {
            if existing.dim == dim && (existing.hybrid || !hybrid) {
                return Ok(());
            }
        }

        let path = self.table_path(agent_id);
        if path.exists() {
            let loaded = self.load_table(&path)?;
            if loaded.dim == dim && (loaded.hybrid || !hybrid) {
                self.tables.insert(agent_id, Arc::new(loaded));
                return Ok(());
            }
            // Shape changed (dimension mismatch, or hybrid newly required):
            // drop and recreate empty.
            fs::remove_file(&path)?;
        }

        self.write_sentinel(&path, dim, hybrid)?;
        self.tables.insert(
            agent_id,
            Arc::new(AgentTable { dim, hybrid, records: DashMap::new() }),
        );
        Ok(())
    }

    fn write_sentinel(&self, path: &Path, dim: usize, hybrid: bool) -> Result<(), StoreError> {
        let mut file = File::create(path)?;
        let sentinel = SchemaSentinel { __schema__: true, dim, hybrid };
        writeln!(file, "{}", serde_json::to_string(&sentinel)?)?;
        Ok(())
    }

    fn load_table(&self, path: &Path) -> Result<AgentTable, StoreError> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();

        let sentinel_line = lines.next().transpose()?.unwrap_or_default();
        let sentinel: SchemaSentinel = serde_json::from_str(&sentinel_line)
            .unwrap_or(SchemaSentinel { __schema__: true, dim: 0, hybrid: false });

        let records = DashMap::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<VectorRecord>(&line) {
                records.insert(record.id, record);
            }
        }
        Ok(AgentTable { dim: sentinel.dim, hybrid: sentinel.hybrid, records })
    }

    fn table(&self, agent_id: Uuid) -> Result<Arc<AgentTable>, StoreError> {
        self.tables.get(&agent_id).map(|r| r.clone()).ok_or(StoreError::TableNotFound(agent_id))
    }

    pub fn table_exists(&self, agent_id: Uuid) -> bool {
        self.tables.contains_key(&agent_id) || self.table_path(agent_id).exists()
    }

    pub fn count_rows(&self, agent_id: Uuid) -> Result<usize, StoreError> {
        Ok(self.table(agent_id)?.records.len())
    }

    /// Append records to the table's in-memory map and on-disk log.
    pub fn add(&self, agent_id: Uuid, records: &[VectorRecord]) -> Result<(), StoreError> {
        let table = self.table(agent_id)?;
        let path = self.table_path(agent_id);
        let mut file = OpenOptions::new().append(true).open(&path)?;
        for record in records {
            writeln!(file, "{}", serde_json::to_string(record)?)?;
            table.records.insert(record.id, record.clone());
        }
        Ok(())
    }

    /// Remove specific rows by id and compact the on-disk log.
    pub fn delete_by_ids(&self, agent_id: Uuid, ids: &[Uuid]) -> Result<(), StoreError> {
        let table = self.table(agent_id)?;
        for id in ids {
            table.records.remove(id);
        }
        self.compact(agent_id, &table)
    }

    /// Remove every row belonging to `folder_id` (used when a folder is
    /// removed or a file within it is deleted/changed).
    pub fn delete_by_folder(&self, agent_id: Uuid, folder_id: Uuid) -> Result<usize, StoreError> {
        let table = self.table(agent_id)?;
        let to_remove: Vec<Uuid> = table
            .records
            .iter()
            .filter(|r| r.folder_id == folder_id)
            .map(|r| r.id)
            .collect();
        for id in &to_remove {
            table.records.remove(id);
        }
        self.compact(agent_id, &table)?;
        Ok(to_remove.len())
    }

    /// Remove every row belonging to a single file path within a folder.
    pub fn delete_by_file(
        &self,
        agent_id: Uuid,
        folder_id: Uuid,
        file_path: &str,
    ) -> Result<Vec<Uuid>, StoreError> {
        let table = self.table(agent_id)?;
        let to_remove: Vec<Uuid> = table
            .records
            .iter()
            .filter(|r| r.folder_id == folder_id && r.file_path == file_path)
            .map(|r| r.id)
            .collect();
        for id in &to_remove {
            table.records.remove(id);
        }
        self.compact(agent_id, &table)?;
        Ok(to_remove)
    }

    fn compact(&self, agent_id: Uuid, table: &AgentTable) -> Result<(), StoreError> {
        let path = self.table_path(agent_id);
        let mut file = File::create(&path)?;
        let sentinel = SchemaSentinel { __schema__: true, dim: table.dim, hybrid: table.hybrid };
        writeln!(file, "{}", serde_json::to_string(&sentinel)?)?;
        for record in table.records.iter() {
            writeln!(file, "{}", serde_json::to_string(record.value())?)?;
        }
        Ok(())
    }

    pub fn drop_table(&self, agent_id: Uuid) -> Result<(), StoreError> {
        self.tables.remove(&agent_id);
        let path = self.table_path(agent_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Drop every on-disk table whose agent id is not in `live_agents`.
    /// Used by the orchestrator's startup sweep to reclaim tables left
    /// behind by a crash between deleting a folder's ledger rows and
    /// dropping its vector table (spec.md §4.5 "orphaned tables").
    pub fn cleanup_orphaned(&self, live_agents: &std::collections::HashSet<Uuid>) -> Result<usize, StoreError> {
        let mut dropped = 0;
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            let Some(id_str) = name.strip_suffix(".vecs.jsonl") else { continue };
            let Ok(agent_id) = Uuid::parse_str(id_str) else { continue };
            if !live_agents.contains(&agent_id) {
                self.drop_table(agent_id)?;
                dropped += 1;
            }
        }
        Ok(dropped)
    }

    /// Brute-force cosine search, optionally scoped to a folder and
    /// blended with a lexical score when the table is hybrid (spec.md
    /// §4.5 "Query", §4.4).
    pub fn search(
        &self,
        agent_id: Uuid,
        query_vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let table = self.table(agent_id)?;
        let top_k = if options.top_k == 0 { 10 } else { options.top_k };

        let mut scored: Vec<SearchHit> = table
            .records
            .iter()
            .filter(|r| options.folder_id.map(|f| f == r.folder_id).unwrap_or(true))
            .map(|entry| {
                let record = entry.value();
                let dense = folderindex_core::lexical::cosine_similarity(query_vector, &record.vector);
                let score = match (&options.lexical_query, &record.lexical_vector) {
                    (Some(lex_q), Some(lex_v)) if table.hybrid => {
                        let lexical = folderindex_core::lexical::cosine_similarity(lex_q, lex_v);
                        let w = options.lexical_weight.clamp(0.0, 1.0);
                        dense * (1.0 - w) + lexical * w
                    }
                    _ => dense,
                };
                SearchHit { record: record.clone(), score }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folderindex_core::now_millis;

    fn sample_record(folder_id: Uuid, file_path: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: Uuid::new_v4(),
            vector,
            text: "hello world".into(),
            folder_id,
            file_path: file_path.into(),
            relative_path: file_path.into(),
            chunk_index: 0,
            token_count: Some(2),
            indexed_at: now_millis(),
            lexical_vector: None,
            start_line: None,
            end_line: None,
            token_offset: None,
            version: 1,
        }
    }

    #[test]
    fn ensure_table_then_add_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::new(dir.path()).unwrap();
        let agent = Uuid::new_v4();
        let folder = Uuid::new_v4();
        store.ensure_table(agent, 3, false).unwrap();

        let r1 = sample_record(folder, "a.rs", vec![1.0, 0.0, 0.0]);
        let r2 = sample_record(folder, "b.rs", vec![0.0, 1.0, 0.0]);
        store.add(agent, &[r1.clone(), r2.clone()]).unwrap();

        let hits = store
            .search(agent, &[1.0, 0.0, 0.0], &SearchOptions { top_k: 1, ..Default::default() })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, r1.id);
    }

    #[test]
    fn ensure_table_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let agent = Uuid::new_v4();
        let folder = Uuid::new_v4();
        {
            let store = VectorStore::new(dir.path()).unwrap();
            store.ensure_table(agent, 3, false).unwrap();
            store.add(agent, &[sample_record(folder, "a.rs", vec![1.0, 0.0, 0.0])]).unwrap();
        }

        let store2 = VectorStore::new(dir.path()).unwrap();
        store2.ensure_table(agent, 3, false).unwrap();
        assert_eq!(store2.count_rows(agent).unwrap(), 1);
    }

    #[test]
    fn delete_by_folder_removes_matching_rows_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::new(dir.path()).unwrap();
        let agent = Uuid::new_v4();
        let folder_a = Uuid::new_v4();
        let folder_b = Uuid::new_v4();
        store.ensure_table(agent, 3, false).unwrap();
        store
            .add(
                agent,
                &[
                    sample_record(folder_a, "a.rs", vec![1.0, 0.0, 0.0]),
                    sample_record(folder_b, "b.rs", vec![0.0, 1.0, 0.0]),
                ],
            )
            .unwrap();

        let removed = store.delete_by_folder(agent, folder_a).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count_rows(agent).unwrap(), 1);
    }

    #[test]
    fn ensure_table_upgrades_to_hybrid_drops_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::new(dir.path()).unwrap();
        let agent = Uuid::new_v4();
        let folder = Uuid::new_v4();
        store.ensure_table(agent, 3, false).unwrap();
        store.add(agent, &[sample_record(folder, "a.rs", vec![1.0, 0.0, 0.0])]).unwrap();

        store.ensure_table(agent, 3, true).unwrap();
        assert_eq!(store.count_rows(agent).unwrap(), 0);
    }
}
