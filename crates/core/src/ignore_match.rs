//! Ignore matching (spec.md §4.2).
//!
//! A [`PatternMatcher`] is built from a folder's `exclude_patterns` plus the
//! folder root, so patterns can be matched against absolute and
//! root-relative forms. [`AGGRESSIVE_EXCLUDES`] is a second, fixed list the
//! file watcher always applies — it must reject these paths before the OS
//! ever opens a descriptor for them.

use regex::Regex;
use std::path::Path;

/// Directories the watcher refuses to descend into regardless of user
/// configuration (spec.md §4.2).
pub const AGGRESSIVE_EXCLUDES: &[&str] = &[
    "node_modules",
    ".git",
    ".next",
    "dist",
    "build",
    "coverage",
    ".local-data",
    "dist-electron",
    ".vscode",
    ".idea",
    "tmp",
    "temp",
    // platform caches
    ".cache",
    "__pycache__",
    ".DS_Store",
];

enum Pattern {
    /// A bare segment, e.g. "vendor" — matches any path component.
    Segment(String),
    /// A fragment containing a slash — matches any subpath.
    Fragment(String),
    /// A glob (contains `*`), compiled to a regex.
    Glob(Regex),
}

/// Matches paths against a folder's configured exclude patterns.
pub struct PatternMatcher {
    patterns: Vec<Pattern>,
    root: String,
}

impl PatternMatcher {
    /// Build a matcher from a pattern list and the folder root it applies
    /// to (used to derive root-relative forms for matching).
    pub fn new(patterns: &[String], root: &Path) -> Self {
        let root = root.to_string_lossy().replace('\\', "/");
        let compiled = patterns.iter().filter_map(|p| compile_pattern(p)).collect();
        Self { patterns: compiled, root }
    }

    /// True if `abs_path` (absolute, `/`-separated) should be excluded.
    pub fn is_excluded(&self, abs_path: &str) -> bool {
        let abs_path = abs_path.replace('\\', "/");
        let rel = abs_path.strip_prefix(&self.root).map(|s| s.trim_start_matches('/'));

        for pattern in &self.patterns {
            match pattern {
                Pattern::Segment(seg) => {
                    if abs_path.split('/').any(|part| part == seg) {
                        return true;
                    }
                }
                Pattern::Fragment(frag) => {
                    if abs_path.contains(frag.as_str()) {
                        return true;
                    }
                    if let Some(rel) = rel {
                        if rel.contains(frag.as_str()) {
                            return true;
                        }
                    }
                }
                Pattern::Glob(re) => {
                    if re.is_match(&abs_path) {
                        return true;
                    }
                    if let Some(rel) = rel {
                        if re.is_match(rel) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }
}

fn compile_pattern(raw: &str) -> Option<Pattern> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.contains('*') {
        return Some(Pattern::Glob(glob_to_regex(raw)));
    }
    if raw.contains('/') {
        return Some(Pattern::Fragment(raw.trim_matches('/').to_string()));
    }
    Some(Pattern::Segment(raw.to_string()))
}

/// Translate a shell-style glob (`*`, `**`) into an anchored regex.
fn glob_to_regex(glob: &str) -> Regex {
    let mut out = String::from("(^|/)");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '?' => out.push('.'),
            other => out.push(other),
        }
    }
    out.push_str("($|/)");
    Regex::new(&out).unwrap_or_else(|_| Regex::new("$^").expect("empty-match regex is valid"))
}

/// The always-on aggressive matcher, independent of any user configuration.
pub fn aggressive_matcher() -> PatternMatcher {
    PatternMatcher {
        patterns: AGGRESSIVE_EXCLUDES.iter().map(|s| Pattern::Segment(s.to_string())).collect(),
        root: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn aggressive_matcher_excludes_node_modules() {
        let m = aggressive_matcher();
        assert!(m.is_excluded("/home/alice/proj/node_modules/foo.js"));
        assert!(m.is_excluded("/home/alice/proj/.git/HEAD"));
        assert!(!m.is_excluded("/home/alice/proj/src/main.rs"));
    }

    #[test]
    fn segment_pattern_matches_any_depth() {
        let root = PathBuf::from("/home/alice/proj");
        let m = PatternMatcher::new(&["vendor".to_string()], &root);
        assert!(m.is_excluded("/home/alice/proj/a/b/vendor/x.rs"));
        assert!(!m.is_excluded("/home/alice/proj/vendored/x.rs"));
    }

    #[test]
    fn glob_star_star_matches_any_subpath() {
        let root = PathBuf::from("/home/alice/proj");
        let m = PatternMatcher::new(&["**/*.snap".to_string()], &root);
        assert!(m.is_excluded("/home/alice/proj/a/b/c.snap"));
        assert!(!m.is_excluded("/home/alice/proj/a/b/c.rs"));
    }

    #[test]
    fn fragment_pattern_with_slash_matches_subpath() {
        let root = PathBuf::from("/home/alice/proj");
        let m = PatternMatcher::new(&["src/generated".to_string()], &root);
        assert!(m.is_excluded("/home/alice/proj/src/generated/foo.rs"));
        assert!(!m.is_excluded("/home/alice/proj/src/other/foo.rs"));
    }
}
