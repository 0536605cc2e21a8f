//! Core types and algorithms for the folder-to-vector indexing engine.
//!
//! This crate is deliberately free of any async runtime, database, or
//! network dependency — it holds the pure pieces that the store and
//! orchestrator crates build on: path safety, ignore/discovery matching,
//! chunking, and the lexical (sparse-hashed) vector used by hybrid search.

pub mod chunker;
pub mod discovery;
pub mod error;
pub mod ignore_match;
pub mod lexical;
pub mod model;
pub mod path_safety;

pub use error::CoreError;
pub use model::*;
