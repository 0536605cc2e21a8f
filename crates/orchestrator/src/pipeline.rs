//! Per-file indexing pipeline (spec.md §4.7 step 8b–8g), shared between a
//! full `sync_folder` run and a debounced watcher batch (spec.md §4.8:
//! "the per-file algorithm from §4.7 steps 8b–8g runs with the same
//! concurrency limit").

use crate::capabilities::normalize;
use crate::deps::Deps;
use crate::extensions::is_text_like;
use crate::mode::ResolvedBehavior;
use crate::state::CancelHandle;
use folderindex_core::chunker::{chunk_by_characters, chunk_by_tokens, resolve_sizing};
use folderindex_core::{lexical, now_millis, FileRecord, FileStatus, FolderRecord, SkipReason, VectorRecord};
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Per-file timeout wrapping the embedding pipeline (spec.md §4.7 step 8e,
/// §5 "Cancellation/timeouts").
pub const FILE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Embedding batch sizes (spec.md §4.7 step 8e).
const REMOTE_BATCH_SIZE: usize = 64;
const LOCAL_BATCH_SIZE: usize = 16;

/// Outcome of processing a single discovered file.
#[derive(Debug)]
pub enum FileOutcome {
    /// Embedded and upserted into the ledger.
    Indexed { chunk_count: usize },
    /// Ledger-only upsert (`should_create_embeddings = false`).
    FilesOnlyIndexed,
    /// Not indexed this run; the ledger is untouched.
    Skipped(SkipReason),
    /// Embedding/parsing failed; already-appended vectors for this file
    /// were rolled back. The ledger is untouched (spec.md §7 category 5).
    Failed(String),
}

fn guess_content_type(ext: &str) -> &'static str {
    match ext {
        "md" | "markdown" => "text/markdown",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        _ => "text/plain",
    }
}

fn file_ext(path: &Path) -> String {
    path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).unwrap_or_default()
}

/// Process one discovered file: size/hash/line checks, then (if the
/// folder's resolved behavior calls for it) parse, chunk, embed, and
/// upsert into the vector store and ledger.
pub async fn process_file(
    deps: &Deps,
    folder: &FolderRecord,
    behavior: &ResolvedBehavior,
    abs_path: &Path,
    relative_path: &str,
    force: bool,
    cancel: &CancelHandle,
) -> FileOutcome {
    if cancel.is_cancelled() {
        return FileOutcome::Skipped(SkipReason::Cancelled);
    }

    let file_path = abs_path.to_string_lossy().to_string();

    let metadata = match tokio::fs::metadata(abs_path).await {
        Ok(m) => m,
        Err(e) => return FileOutcome::Failed(format!("stat failed: {e}")),
    };
    let size_bytes = metadata.len();
    if size_bytes > behavior.max_file_size_bytes {
        return FileOutcome::Skipped(SkipReason::MaxFileSize);
    }

    let bytes = match tokio::fs::read(abs_path).await {
        Ok(b) => b,
        Err(e) => return FileOutcome::Failed(format!("read failed: {e}")),
    };
    let content_hash = format!("{:x}", md5::compute(&bytes));

    let existing = deps
        .ledger
        .get_file_by_path(folder.folder_id, &file_path)
        .unwrap_or(None);

    if !force {
        if let Some(existing) = &existing {
            if existing.content_hash == content_hash {
                return FileOutcome::Skipped(SkipReason::Unchanged);
            }
        }
    }

    let ext = file_ext(abs_path);
    if is_text_like(&ext) {
        let text = String::from_utf8_lossy(&bytes);
        let line_count = text.lines().count();
        if line_count > deps.config.default_max_file_lines {
            return FileOutcome::Skipped(SkipReason::MaxFileLines);
        }
        if text.lines().any(|l| l.len() > deps.config.default_max_line_length) {
            return FileOutcome::Skipped(SkipReason::MaxLineLength);
        }
    }

    let modified_at = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or_else(now_millis);

    if !behavior.should_create_embeddings {
        if let Some(existing) = &existing {
            if !existing.vector_point_ids.is_empty() {
                let _ = deps.vector_store.delete_by_ids(folder.agent_id, &existing.vector_point_ids);
            }
        }
        let record = FileRecord {
            file_id: existing.map(|e| e.file_id).unwrap_or_else(Uuid::new_v4),
            folder_id: folder.folder_id,
            agent_id: folder.agent_id,
            file_path,
            relative_path: relative_path.to_string(),
            content_hash,
            size_bytes,
            modified_at,
            chunk_count: 0,
            vector_point_ids: Vec::new(),
            status: FileStatus::Indexed,
            last_indexed_at: Some(now_millis()),
        };
        if let Err(e) = deps.ledger.upsert_file(&record) {
            return FileOutcome::Failed(e.to_string());
        }
        return FileOutcome::FilesOnlyIndexed;
    }

    if let Some(existing) = &existing {
        if !existing.vector_point_ids.is_empty() {
            let _ = deps.vector_store.delete_by_ids(folder.agent_id, &existing.vector_point_ids);
        }
    }

    let text = match deps.parser.extract_text(&bytes, guess_content_type(&ext), &file_path) {
        Ok(t) => t,
        Err(e) => return FileOutcome::Failed(format!("parse failed: {e}")),
    };

    let hybrid = deps.settings.hybrid_search_enabled();
    let sizing = resolve_sizing(folder);
    let chunk_result = if hybrid {
        // Token-mode chunking carries the line/offset provenance the
        // hybrid vector record schema needs (spec.md §3 "Vector record").
        // ~4 characters/token is a coarse approximation; the spec names no
        // specific tokenizer (resolved as an Open Question in DESIGN.md).
        let window_tokens = (sizing.size / 4).max(1);
        let stride_tokens = ((sizing.size - sizing.overlap) / 4).max(1).min(window_tokens);
        chunk_by_tokens(&text, window_tokens, stride_tokens)
    } else {
        chunk_by_characters(&text, sizing, None)
    };
    let chunks = match chunk_result {
        Ok(c) => c,
        Err(e) => return FileOutcome::Failed(e.to_string()),
    };

    let batch_size = if deps.embedding.is_local() { LOCAL_BATCH_SIZE } else { REMOTE_BATCH_SIZE };
    let deadline = Instant::now() + FILE_TIMEOUT;
    let mut appended_ids: Vec<Uuid> = Vec::new();
    let mut table_dim: Option<usize> = None;

    for batch in chunks.chunks(batch_size) {
        if cancel.is_cancelled() || Instant::now() >= deadline {
            if !appended_ids.is_empty() {
                let _ = deps.vector_store.delete_by_ids(folder.agent_id, &appended_ids);
            }
            return FileOutcome::Skipped(SkipReason::Cancelled);
        }

        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let mut vectors = match deps.embedding.embed_many(&texts) {
            Ok(v) => v,
            Err(e) => {
                if !appended_ids.is_empty() {
                    let _ = deps.vector_store.delete_by_ids(folder.agent_id, &appended_ids);
                }
                return FileOutcome::Failed(format!("embedding failed: {e}"));
            }
        };
        normalize(&mut vectors);

        let dim = *table_dim.get_or_insert_with(|| vectors.first().map(|v| v.len()).unwrap_or(0));
        if dim > 0 {
            if let Err(e) = deps.vector_store.ensure_table(folder.agent_id, dim, hybrid) {
                if !appended_ids.is_empty() {
                    let _ = deps.vector_store.delete_by_ids(folder.agent_id, &appended_ids);
                }
                return FileOutcome::Failed(e.to_string());
            }
        }

        let now = now_millis();
        let records: Vec<VectorRecord> = batch
            .iter()
            .zip(vectors.into_iter())
            .map(|(chunk, vector)| VectorRecord {
                id: Uuid::new_v4(),
                vector,
                text: chunk.text.clone(),
                folder_id: folder.folder_id,
                file_path: file_path.clone(),
                relative_path: relative_path.to_string(),
                chunk_index: chunk.index,
                token_count: chunk.token_count,
                indexed_at: now,
                lexical_vector: if hybrid { Some(lexical::lexical_vector(&chunk.text)) } else { None },
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                token_offset: chunk.token_offset,
                version: if hybrid { 2 } else { 1 },
            })
            .collect();

        if let Err(e) = deps.vector_store.add(folder.agent_id, &records) {
            if !appended_ids.is_empty() {
                let _ = deps.vector_store.delete_by_ids(folder.agent_id, &appended_ids);
            }
            return FileOutcome::Failed(e.to_string());
        }
        appended_ids.extend(records.iter().map(|r| r.id));
    }

    let chunk_count = chunks.len();
    let record = FileRecord {
        file_id: existing.map(|e| e.file_id).unwrap_or_else(Uuid::new_v4),
        folder_id: folder.folder_id,
        agent_id: folder.agent_id,
        file_path,
        relative_path: relative_path.to_string(),
        content_hash,
        size_bytes,
        modified_at,
        chunk_count,
        vector_point_ids: appended_ids,
        status: FileStatus::Indexed,
        last_indexed_at: Some(now_millis()),
    };
    if let Err(e) = deps.ledger.upsert_file(&record) {
        return FileOutcome::Failed(e.to_string());
    }

    FileOutcome::Indexed { chunk_count }
}

/// Approximate elapsed-since marker used by the progress-flush throttle
/// (spec.md §4.7 step 8h: "periodically, >=500ms since last persistence").
pub fn elapsed_since_ms(since: SystemTime) -> u64 {
    since.elapsed().map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_guess_falls_back_to_plain_text() {
        assert_eq!(guess_content_type("xyz"), "text/plain");
        assert_eq!(guess_content_type("md"), "text/markdown");
    }
}
