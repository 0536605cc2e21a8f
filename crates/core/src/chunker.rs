//! Chunker (spec.md §4.3): text -> ordered chunks by characters or token
//! windows, carrying line/offset provenance.

use crate::error::CoreError;
use crate::model::{ChunkPreset, FolderRecord};

/// Resolved chunk-size parameters for a folder (spec.md §4.3 preset table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizing {
    pub size: usize,
    pub overlap: usize,
}

/// `balanced` is the global default; callers may override it, but the
/// constant lives here so the preset table in `resolve_sizing` stays the
/// single source of truth spec.md §4.3 describes.
const BALANCED_SIZE: usize = 1400;
const BALANCED_OVERLAP: usize = 200;

/// Resolve a folder's chunk preset (plus overrides) into concrete
/// `{size, overlap}`, clamping overlap to `<= size - 1` for the `custom`
/// preset per spec.md §4.3.
pub fn resolve_sizing(folder: &FolderRecord) -> ChunkSizing {
    match folder.chunk_preset {
        ChunkPreset::Balanced => ChunkSizing { size: BALANCED_SIZE, overlap: BALANCED_OVERLAP },
        ChunkPreset::Small => ChunkSizing { size: 900, overlap: 180 },
        ChunkPreset::Large => ChunkSizing { size: 2200, overlap: 300 },
        ChunkPreset::Custom => {
            let size = folder.chunk_size_override.unwrap_or(BALANCED_SIZE).max(1);
            let overlap = folder.chunk_overlap_override.unwrap_or(BALANCED_OVERLAP).min(size - 1);
            ChunkSizing { size, overlap }
        }
    }
}

/// One chunk of a file's text, ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub token_count: Option<usize>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub token_offset: Option<usize>,
}

/// Character-mode chunking: splits `text` into windows of `sizing.size`
/// characters with `sizing.overlap` characters of continuity between
/// consecutive chunks. `max_chunks` optionally bounds the number of chunks
/// produced per file.
pub fn chunk_by_characters(
    text: &str,
    sizing: ChunkSizing,
    max_chunks: Option<usize>,
) -> Result<Vec<Chunk>, CoreError> {
    if sizing.overlap >= sizing.size {
        return Err(CoreError::InvalidChunkConfig(format!(
            "overlap ({}) must be less than size ({})",
            sizing.overlap, sizing.size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let stride = sizing.size - sizing.overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < chars.len() {
        if let Some(max) = max_chunks {
            if index >= max {
                break;
            }
        }
        let end = (start + sizing.size).min(chars.len());
        let slice: String = chars[start..end].iter().collect();
        chunks.push(Chunk {
            index,
            text: slice,
            token_count: None,
            start_line: None,
            end_line: None,
            token_offset: None,
        });
        index += 1;
        if end == chars.len() {
            break;
        }
        start += stride;
    }

    Ok(chunks)
}

/// A single whitespace-delimited token with the line it occurs on
/// (1-indexed).
struct LinedToken<'a> {
    text: &'a str,
    line: usize,
}

fn tokenize_with_lines(text: &str) -> Vec<LinedToken> {
    let mut tokens = Vec::new();
    for (line_idx, line) in text.split('\n').enumerate() {
        for word in line.split_whitespace() {
            tokens.push(LinedToken { text: word, line: line_idx + 1 });
        }
    }
    tokens
}

/// Token-mode chunking: slides a `window_tokens`/`stride_tokens` window
/// over a tokenization of `text`, recording `start_line`, `end_line`, and
/// `token_offset` for each window so retrieval can surface the source
/// region (spec.md §4.3).
pub fn chunk_by_tokens(
    text: &str,
    window_tokens: usize,
    stride_tokens: usize,
) -> Result<Vec<Chunk>, CoreError> {
    if stride_tokens == 0 || stride_tokens > window_tokens {
        return Err(CoreError::InvalidChunkConfig(format!(
            "stride ({stride_tokens}) must be in (0, window ({window_tokens})]"
        )));
    }

    let tokens = tokenize_with_lines(text);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < tokens.len() {
        let end = (start + window_tokens).min(tokens.len());
        let window = &tokens[start..end];
        let joined = window.iter().map(|t| t.text).collect::<Vec<_>>().join(" ");
        chunks.push(Chunk {
            index,
            text: joined,
            token_count: Some(window.len()),
            start_line: window.first().map(|t| t.line),
            end_line: window.last().map(|t| t.line),
            token_offset: Some(start),
        });
        index += 1;
        if end == tokens.len() {
            break;
        }
        start += stride_tokens;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn character_mode_splits_with_overlap() {
        let text = "a".repeat(25);
        let sizing = ChunkSizing { size: 10, overlap: 2 };
        let chunks = chunk_by_characters(&text, sizing, None).unwrap();
        // stride = 8: starts at 0, 8, 16, 24 (last window clipped to 1 char)
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text.len(), 10);
        assert_eq!(chunks.last().unwrap().index, 3);
    }

    #[test]
    fn character_mode_respects_max_chunks() {
        let text = "a".repeat(100);
        let sizing = ChunkSizing { size: 10, overlap: 0 };
        let chunks = chunk_by_characters(&text, sizing, Some(3)).unwrap();
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn character_mode_rejects_overlap_ge_size() {
        let sizing = ChunkSizing { size: 10, overlap: 10 };
        assert!(chunk_by_characters("hello", sizing, None).is_err());
    }

    #[test]
    fn token_mode_last_chunk_end_line_matches_last_nonempty_line() {
        let text = "one two three\nfour five\nsix";
        let chunks = chunk_by_tokens(text, 3, 3).unwrap();
        let last = chunks.last().unwrap();
        assert_eq!(last.end_line, Some(3));
    }

    #[test]
    fn token_mode_windows_are_contiguous_and_monotonic() {
        let text = (0..20).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let chunks = chunk_by_tokens(&text, 5, 5).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn custom_preset_clamps_overlap_below_size() {
        let mut folder = sample_folder();
        folder.chunk_preset = ChunkPreset::Custom;
        folder.chunk_size_override = Some(100);
        folder.chunk_overlap_override = Some(500);
        let sizing = resolve_sizing(&folder);
        assert_eq!(sizing.size, 100);
        assert_eq!(sizing.overlap, 99);
    }

    #[test]
    fn preset_table_matches_spec() {
        let mut folder = sample_folder();
        folder.chunk_preset = ChunkPreset::Small;
        assert_eq!(resolve_sizing(&folder), ChunkSizing { size: 900, overlap: 180 });
        folder.chunk_preset = ChunkPreset::Large;
        assert_eq!(resolve_sizing(&folder), ChunkSizing { size: 2200, overlap: 300 });
    }

    fn sample_folder() -> FolderRecord {
        use crate::model::*;
        use std::collections::{HashMap, HashSet};
        use uuid::Uuid;
        FolderRecord {
            folder_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            folder_path: "/tmp/proj".into(),
            recursive: true,
            include_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            file_type_filters: HashSet::new(),
            max_file_size_bytes: 1_000_000,
            chunk_preset: ChunkPreset::Balanced,
            chunk_size_override: None,
            chunk_overlap_override: None,
            indexing_mode: IndexingMode::Auto,
            sync_mode: SyncMode::Auto,
            sync_cadence_minutes: 15,
            reindex_policy: ReindexPolicy::Smart,
            status: FolderStatus::Pending,
            last_error: None,
            last_synced_at: None,
            updated_at: 0,
            file_count: 0,
            chunk_count: 0,
            skip_reasons: HashMap::new(),
            last_run_metadata: LastRunMetadata::default(),
            embedding_model: None,
            is_primary: true,
        }
    }
}
