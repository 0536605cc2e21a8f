//! Shared domain types: folder/file/vector records and the enums that
//! configure them. Mirrors the data model in spec.md §3 one-to-one.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// What gets persisted per file: embeddings + ledger, ledger only, or
/// whichever is currently viable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexingMode {
    FilesOnly,
    Full,
    Auto,
}

/// Who may trigger a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Auto,
    Manual,
    Scheduled,
    Triggered,
}

/// What triggered a particular sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Manual,
    Auto,
    Triggered,
    Scheduled,
}

/// When to force re-embedding of unchanged files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReindexPolicy {
    Smart,
    Always,
    Never,
}

/// Named chunk-size presets plus a custom override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkPreset {
    Balanced,
    Small,
    Large,
    Custom,
}

/// Lifecycle status of a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderStatus {
    Pending,
    Syncing,
    Synced,
    Error,
    Paused,
}

impl FolderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FolderStatus::Pending => "pending",
            FolderStatus::Syncing => "syncing",
            FolderStatus::Synced => "synced",
            FolderStatus::Error => "error",
            FolderStatus::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FolderStatus::Pending),
            "syncing" => Some(FolderStatus::Syncing),
            "synced" => Some(FolderStatus::Synced),
            "error" => Some(FolderStatus::Error),
            "paused" => Some(FolderStatus::Paused),
            _ => None,
        }
    }
}

/// Status of a single file's last indexing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Indexed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Indexed => "indexed",
            FileStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FileStatus::Pending),
            "indexed" => Some(FileStatus::Indexed),
            "failed" => Some(FileStatus::Failed),
            _ => None,
        }
    }
}

/// Last-run bookkeeping persisted on the folder row (spec.md §3, `last_run_metadata`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastRunMetadata {
    pub last_trigger: Option<SyncTrigger>,
    pub duration_ms: Option<u64>,
    pub files_processed: Option<usize>,
    pub files_indexed: Option<usize>,
    pub files_removed: Option<usize>,
    /// Unix millis of the last time a `smart` reindex policy forced a full reindex.
    pub smart_reindex_at: Option<i64>,
}

/// Durable folder configuration + status (spec.md §3 "Folder record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderRecord {
    pub folder_id: Uuid,
    pub agent_id: Uuid,
    pub user_id: Uuid,

    /// Always normalized: `~` expanded, absolute, no trailing separator.
    pub folder_path: String,

    pub recursive: bool,
    pub include_extensions: HashSet<String>,
    pub exclude_patterns: Vec<String>,
    pub file_type_filters: HashSet<String>,
    pub max_file_size_bytes: u64,
    pub chunk_preset: ChunkPreset,
    pub chunk_size_override: Option<usize>,
    pub chunk_overlap_override: Option<usize>,
    pub indexing_mode: IndexingMode,
    pub sync_mode: SyncMode,
    pub sync_cadence_minutes: u32,
    pub reindex_policy: ReindexPolicy,

    pub status: FolderStatus,
    pub last_error: Option<String>,
    pub last_synced_at: Option<i64>,
    pub updated_at: i64,
    pub file_count: usize,
    pub chunk_count: usize,
    pub skip_reasons: HashMap<String, usize>,
    pub last_run_metadata: LastRunMetadata,
    pub embedding_model: Option<String>,
    pub is_primary: bool,
}

impl FolderRecord {
    /// Effective extension whitelist: `file_type_filters` overrides
    /// `include_extensions` when non-empty (spec.md §4.2).
    pub fn effective_extensions(&self) -> &HashSet<String> {
        if self.file_type_filters.is_empty() {
            &self.include_extensions
        } else {
            &self.file_type_filters
        }
    }
}

/// Durable per-file record (spec.md §3 "File record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: Uuid,
    pub folder_id: Uuid,
    pub agent_id: Uuid,

    pub file_path: String,
    pub relative_path: String,

    pub content_hash: String,

    pub size_bytes: u64,
    pub modified_at: i64,
    pub chunk_count: usize,
    pub vector_point_ids: Vec<Uuid>,
    pub status: FileStatus,
    pub last_indexed_at: Option<i64>,
}

/// One row in the columnar vector store: one chunk + its dense (and
/// optionally lexical) vector (spec.md §3 "Vector record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub text: String,
    pub folder_id: Uuid,
    pub file_path: String,
    pub relative_path: String,
    pub chunk_index: usize,
    pub token_count: Option<usize>,
    pub indexed_at: i64,

    /// Present only when hybrid mode is enabled (`version = 2`).
    pub lexical_vector: Option<Vec<f32>>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub token_offset: Option<usize>,
    pub version: u32,
}

impl VectorRecord {
    pub fn is_hybrid(&self) -> bool {
        self.lexical_vector.is_some()
    }
}

/// A reason a file was skipped during a sync run (spec.md §4.7 step 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Cancelled,
    MaxFileSize,
    Unchanged,
    MaxFileLines,
    MaxLineLength,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Cancelled => "cancelled",
            SkipReason::MaxFileSize => "max_file_size",
            SkipReason::Unchanged => "unchanged",
            SkipReason::MaxFileLines => "max_file_lines",
            SkipReason::MaxLineLength => "max_line_length",
        }
    }
}

/// Current Unix time in milliseconds. Centralized so the rest of the crate
/// never calls `SystemTime::now()` directly (keeps timestamp handling in
/// one place, and gives tests a single seam to stub if ever needed).
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}
