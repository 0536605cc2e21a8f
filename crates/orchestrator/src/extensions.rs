//! Extension classification for the per-file size/line checks (spec.md
//! §4.7 step 8d): "binary/document extensions bypass this step", so we
//! need a way to tell them apart from source/text extensions whose line
//! count and line length are worth bounding.

/// Extensions the orchestrator treats as binary or pre-formatted document
/// content — the `line_count`/`line_length` checks don't apply to these;
/// only the file-size and document-parser path matter.
const BINARY_OR_DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "odt", "ods", "odp", "rtf", "png", "jpg",
    "jpeg", "gif", "bmp", "webp", "ico", "tiff", "svg", "zip", "tar", "gz", "bz2", "7z", "rar",
    "mp3", "mp4", "mov", "avi", "wav", "flac", "ogg", "wasm", "exe", "dll", "so", "dylib", "bin",
    "class", "jar", "woff", "woff2", "ttf", "otf", "db", "sqlite",
];

pub fn is_text_like(ext: &str) -> bool {
    !BINARY_OR_DOCUMENT_EXTENSIONS.contains(&ext)
}
