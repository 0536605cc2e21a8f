//! Discovery (spec.md §4.2): recursive file enumeration with ignore
//! matching and an extension whitelist.
//!
//! Grounded in the teacher's `scan.rs::walk_files_parallel` — an
//! `ignore::WalkBuilder` driven in parallel via its own thread pool, with a
//! `filter_entry` closure that prunes excluded directories before the walk
//! ever descends into them.

use crate::ignore_match::{aggressive_matcher, PatternMatcher};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One discovered file: its absolute path and its path relative to the
/// folder root (forward-slash separated, matching spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub abs_path: PathBuf,
    pub relative_path: String,
}

/// Folder-scoped discovery configuration.
pub struct DiscoveryConfig<'a> {
    pub root: &'a Path,
    pub recursive: bool,
    pub exclude_patterns: &'a [String],
    pub extensions: &'a HashSet<String>,
}

/// Walk `config.root`, pruning directories matched by the aggressive
/// excludes or the folder's own `exclude_patterns`, and returning every
/// regular file whose lowercased, dotless extension is in
/// `config.extensions` (an empty whitelist means "all files").
pub fn discover(config: &DiscoveryConfig) -> Vec<DiscoveredFile> {
    if !config.root.exists() {
        return Vec::new();
    }

    let aggressive = aggressive_matcher();
    let user = PatternMatcher::new(config.exclude_patterns, config.root);
    let results: Mutex<Vec<DiscoveredFile>> = Mutex::new(Vec::new());
    let root = config.root.to_path_buf();
    let extensions = config.extensions.clone();
    let max_depth = if config.recursive { None } else { Some(1) };

    let mut builder = WalkBuilder::new(&root);
    builder
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .max_depth(max_depth)
        .threads(rayon::current_num_threads().min(12))
        .filter_entry(move |entry| {
            let path_str = entry.path().to_string_lossy().replace('\\', "/");
            !(aggressive.is_excluded(&path_str) || user.is_excluded(&path_str))
        });

    builder.build_parallel().run(|| {
        let root = root.clone();
        let extensions = &extensions;
        let results = &results;
        Box::new(move |entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => return ignore::WalkState::Continue,
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                return ignore::WalkState::Continue;
            }

            let abs_path = entry.path().to_path_buf();
            let ext = abs_path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();

            if !extensions.is_empty() && !extensions.contains(&ext) {
                return ignore::WalkState::Continue;
            }

            let relative_path = abs_path
                .strip_prefix(&root)
                .unwrap_or(&abs_path)
                .to_string_lossy()
                .replace('\\', "/");

            results.lock().unwrap().push(DiscoveredFile { abs_path, relative_path });
            ignore::WalkState::Continue
        })
    });

    results.into_inner().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn exts(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn discovers_files_respecting_extension_whitelist() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "hello").unwrap();
        fs::write(dir.path().join("b.bin"), "hello").unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/x.md"), "hello").unwrap();

        let extensions = exts(&["md"]);
        let config = DiscoveryConfig {
            root: dir.path(),
            recursive: true,
            exclude_patterns: &[],
            extensions: &extensions,
        };
        let found = discover(&config);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relative_path, "a.md");
    }

    #[test]
    fn non_recursive_skips_subdirectories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "hello").unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.md"), "hello").unwrap();

        let extensions = exts(&["md"]);
        let config = DiscoveryConfig {
            root: dir.path(),
            recursive: false,
            exclude_patterns: &[],
            extensions: &extensions,
        };
        let found = discover(&config);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relative_path, "a.md");
    }

    #[test]
    fn empty_whitelist_matches_all_extensions() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "hello").unwrap();
        fs::write(dir.path().join("b.xyz"), "hello").unwrap();

        let extensions = HashSet::new();
        let config = DiscoveryConfig {
            root: dir.path(),
            recursive: true,
            exclude_patterns: &[],
            extensions: &extensions,
        };
        let found = discover(&config);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn user_exclude_pattern_is_honored() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("vendor")).unwrap();
        fs::write(dir.path().join("vendor/a.md"), "hello").unwrap();
        fs::write(dir.path().join("b.md"), "hello").unwrap();

        let extensions = exts(&["md"]);
        let patterns = vec!["vendor".to_string()];
        let config = DiscoveryConfig {
            root: dir.path(),
            recursive: true,
            exclude_patterns: &patterns,
            extensions: &extensions,
        };
        let found = discover(&config);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relative_path, "b.md");
    }
}
