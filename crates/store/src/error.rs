//! Store-level error type. Wraps the two fallible backends (`rusqlite` for
//! the ledger, plain I/O for the vector-record files) behind one enum so
//! callers in the orchestrator crate can propagate with `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("folder not found: {0}")]
    FolderNotFound(uuid::Uuid),

    #[error("file not found: {0}")]
    FileNotFound(uuid::Uuid),

    #[error("duplicate folder for agent at path {0}")]
    DuplicateFolder(String),

    #[error("vector table not found for agent {0}")]
    TableNotFound(uuid::Uuid),
}
