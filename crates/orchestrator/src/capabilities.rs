//! Consumed capabilities (spec.md §6 "Consumed capabilities").
//!
//! The orchestrator depends only on these trait objects, never on a
//! concrete model-provider SDK or settings backend — per spec.md §1, those
//! are external collaborators. The embedding application constructs
//! implementations and injects them into [`crate::engine::Engine::new`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Task-registry lifecycle events the embedding application forwards into
/// [`crate::engine::Engine::handle_task_event`] (spec.md §6 "Task registry:
/// event stream with `{event_type, task_type, agent_id}`", §4.8 "Chat-run
/// coordination"). The registry itself is owned by the host application,
/// not this engine — the host subscribes once and relays events in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEventKind {
    Started,
    Completed,
}

/// `embed_many` + model identity. Implementations must return unit-length
/// vectors; [`normalize`] is provided for implementations that don't
/// normalize internally.
pub trait EmbeddingProvider: Send + Sync {
    fn embed_many(&self, values: &[String]) -> Result<Vec<Vec<f32>>, String>;
    fn model_id(&self) -> &str;
    /// `true` for an on-device model — caps sync concurrency at 2 instead
    /// of 5 and batches embedding calls at ≤16 instead of ≤64 (spec.md
    /// §4.7 step 7/8e).
    fn is_local(&self) -> bool;
}

/// bytes + content-type → plain text (spec.md §4.3, external).
pub trait DocumentParser: Send + Sync {
    fn extract_text(&self, bytes: &[u8], content_type: &str, path: &str) -> Result<String, String>;
}

/// Default/test `DocumentParser`: treats every file as UTF-8 text (lossily
/// decoded), with no format-specific extraction. A real deployment injects
/// a parser backed by an actual document-conversion capability (PDF, DOCX,
/// …); this stub exists so the pipeline is runnable end-to-end for plain
/// text and code files without one.
pub struct PlainTextDocumentParser;

impl DocumentParser for PlainTextDocumentParser {
    fn extract_text(&self, bytes: &[u8], _content_type: &str, _path: &str) -> Result<String, String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Read-only global settings (spec.md §6).
pub trait SettingsStore: Send + Sync {
    fn vector_db_enabled(&self) -> bool;
    fn vector_sync_interval_minutes(&self) -> u32;
    fn vector_auto_sync_enabled(&self) -> bool;
    fn embedding_provider_is_local(&self) -> bool;
    fn hybrid_search_enabled(&self) -> bool {
        true
    }
}

/// L2-normalize a batch of embeddings to unit length, in place. Some
/// providers (local TF-IDF-ish stand-ins in particular) don't normalize
/// internally; the orchestrator always calls this before appending
/// records, per spec.md §4.7 step 8e.
pub fn normalize(vectors: &mut [Vec<f32>]) {
    for v in vectors.iter_mut() {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
    }
}

/// Deterministic hashed-embedding stand-in, used as the default/test
/// `EmbeddingProvider` so the crate is runnable without a real model API.
/// Grounded in the teacher's hashed-bucket approach to lexical vectors
/// (`folderindex_core::lexical`) — same idea, applied to a denser "dense"
/// vector so the rest of the pipeline (ensure_table, search) has something
/// real to exercise. Not a substitute for an actual embedding model.
pub struct LocalLexicalEmbeddingProvider {
    dim: usize,
}

impl LocalLexicalEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for LocalLexicalEmbeddingProvider {
    fn default() -> Self {
        Self::new(128)
    }
}

impl EmbeddingProvider for LocalLexicalEmbeddingProvider {
    fn embed_many(&self, values: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            let mut buckets = vec![0f32; self.dim];
            for (i, term) in value.split_whitespace().enumerate() {
                let mut hasher = DefaultHasher::new();
                term.hash(&mut hasher);
                (i as u64).hash(&mut hasher);
                let bucket = (hasher.finish() as usize) % self.dim;
                buckets[bucket] += 1.0;
            }
            out.push(buckets);
        }
        normalize(&mut out);
        Ok(out)
    }

    fn model_id(&self) -> &str {
        "local-lexical-stub"
    }

    fn is_local(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_yields_unit_length() {
        let mut vectors = vec![vec![3.0, 4.0]];
        normalize(&mut vectors);
        let norm = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn normalize_leaves_zero_vector_alone() {
        let mut vectors = vec![vec![0.0, 0.0]];
        normalize(&mut vectors);
        assert_eq!(vectors[0], vec![0.0, 0.0]);
    }

    #[test]
    fn local_provider_is_deterministic() {
        let provider = LocalLexicalEmbeddingProvider::default();
        let a = provider.embed_many(&["hello world".to_string()]).unwrap();
        let b = provider.embed_many(&["hello world".to_string()]).unwrap();
        assert_eq!(a, b);
        assert!(provider.is_local());
    }
}
