//! Orchestrator-level error type (spec.md §7 categories (1)/(2)/(6)).
//!
//! Categories (3)/(4)/(5) — transient I/O, per-file skips, embedding
//! failures — are recorded as data in the folder/file ledger rather than
//! propagated as Rust errors; this enum exists for the cases a caller
//! might actually branch on.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
    #[error("folder not found: {0}")]
    FolderNotFound(Uuid),

    #[error("unsafe path: {0}")]
    UnsafePath(String),

    #[error("duplicate folder at path {0}")]
    DuplicateFolder(String),

    #[error("trigger {trigger} is not permitted by sync_mode for folder {folder_id}")]
    TriggerNotAllowed { folder_id: Uuid, trigger: &'static str },

    #[error("a sync is already running for folder {0}")]
    AlreadySyncing(Uuid),

    #[error("store error: {0}")]
    Store(#[from] folderindex_store::StoreError),

    #[error("run failed: {0}")]
    RunFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
