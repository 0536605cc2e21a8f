//! Relational schema for the folder/file ledger (spec.md §3, §4.6.1).
//!
//! Schema *migration tooling* is explicitly out of scope (spec.md §1) — the
//! engine owns the DDL itself and applies it idempotently with
//! `CREATE TABLE IF NOT EXISTS` on every open, the same way
//! `Clemens865-superbrain-app`'s indexer bootstraps its SQLite file.

pub const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS folders (
    folder_id               TEXT PRIMARY KEY,
    agent_id                TEXT NOT NULL,
    user_id                 TEXT NOT NULL,
    folder_path             TEXT NOT NULL,
    recursive               INTEGER NOT NULL,
    include_extensions      TEXT NOT NULL,
    exclude_patterns        TEXT NOT NULL,
    file_type_filters       TEXT NOT NULL,
    max_file_size_bytes     INTEGER NOT NULL,
    chunk_preset            TEXT NOT NULL,
    chunk_size_override     INTEGER,
    chunk_overlap_override  INTEGER,
    indexing_mode           TEXT NOT NULL,
    sync_mode               TEXT NOT NULL,
    sync_cadence_minutes    INTEGER NOT NULL,
    reindex_policy          TEXT NOT NULL,
    status                  TEXT NOT NULL,
    last_error              TEXT,
    last_synced_at          INTEGER,
    updated_at              INTEGER NOT NULL,
    file_count              INTEGER NOT NULL,
    chunk_count             INTEGER NOT NULL,
    skip_reasons            TEXT NOT NULL,
    last_run_metadata       TEXT NOT NULL,
    embedding_model         TEXT,
    is_primary              INTEGER NOT NULL,
    UNIQUE(agent_id, folder_path)
);

CREATE INDEX IF NOT EXISTS idx_folders_agent ON folders(agent_id);
CREATE INDEX IF NOT EXISTS idx_folders_status ON folders(status);

CREATE TABLE IF NOT EXISTS files (
    file_id          TEXT PRIMARY KEY,
    folder_id        TEXT NOT NULL REFERENCES folders(folder_id) ON DELETE CASCADE,
    agent_id         TEXT NOT NULL,
    file_path        TEXT NOT NULL,
    relative_path    TEXT NOT NULL,
    content_hash     TEXT NOT NULL,
    size_bytes       INTEGER NOT NULL,
    modified_at      INTEGER NOT NULL,
    chunk_count      INTEGER NOT NULL,
    vector_point_ids TEXT NOT NULL,
    status           TEXT NOT NULL,
    last_indexed_at  INTEGER,
    UNIQUE(folder_id, file_path)
);

CREATE INDEX IF NOT EXISTS idx_files_folder ON files(folder_id);
"#;
