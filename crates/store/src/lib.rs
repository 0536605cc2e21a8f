//! Durable state for the folder-to-vector indexing engine: the relational
//! folder/file ledger (spec.md §4.6) and the embedded columnar vector
//! store adapter (spec.md §4.5).

pub mod error;
pub mod json_fields;
pub mod ledger;
pub mod schema;
pub mod vector_store;

pub use error::StoreError;
pub use ledger::Ledger;
pub use vector_store::{SearchHit, SearchOptions, VectorStore};
