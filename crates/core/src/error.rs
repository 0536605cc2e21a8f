//! Crate-wide error type.
//!
//! Leaf helpers that only ever produce a human-readable description (the
//! embedding/parsing capabilities in particular) keep returning
//! `Result<T, String>`, matching the teacher's own convention in
//! `semantic.rs`/`scan.rs`. `CoreError` is reserved for the handful of
//! operations whose failure modes a caller might actually branch on.

use std::fmt;

/// Errors produced by the path-safety, discovery, and chunking operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A user-supplied path failed the path-safety predicate. Carries the
    /// exact user-facing message from spec.md §4.1.
    UnsafePath(String),
    /// A chunking configuration was invalid (e.g. overlap >= size).
    InvalidChunkConfig(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::UnsafePath(msg) => write!(f, "{msg}"),
            CoreError::InvalidChunkConfig(msg) => write!(f, "invalid chunk configuration: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}
