//! Path Safety (spec.md §4.1).
//!
//! Rejects filesystem roots, OS internals, app-bundle internals, and
//! too-shallow paths before a folder is ever registered. Normalization
//! (`~` expansion, absolute resolution) happens before these checks run —
//! see [`normalize`].

use std::path::{Path, PathBuf};

/// Unix system directories a folder root must never land inside.
const UNIX_BLOCKLIST: &[&str] = &[
    "/System", "/Library", "/Applications", "/Users", "/var", "/etc", "/private", "/usr", "/opt",
    "/sbin", "/bin", "/tmp", "/Volumes", "/cores", "/dev", "/proc", "/run", "/snap", "/boot",
    "/root", "/srv", "/lib", "/lib64",
];

/// Windows system directory names (matched case-insensitively as the
/// first path segment after the drive root).
const WINDOWS_BLOCKLIST: &[&str] = &[
    "Windows",
    "Program Files",
    "Program Files (x86)",
    "Users",
    "ProgramData",
    "System Volume Information",
];

/// Result of a path-safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Unsafe(String),
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Safe)
    }
}

/// Expand a leading `~` and resolve to an absolute path. Does not require
/// the path to exist — `Path::canonicalize` would, and folders are often
/// registered before their first sync.
pub fn normalize(path: &Path) -> PathBuf {
    let expanded = expand_tilde(path);
    if expanded.is_absolute() {
        strip_trailing_separator(&expanded)
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        strip_trailing_separator(&cwd.join(expanded))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    } else if s == "~" {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home);
        }
    }
    path.to_path_buf()
}

fn strip_trailing_separator(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.len() > 1 && (s.ends_with('/') || s.ends_with('\\')) {
        PathBuf::from(s.trim_end_matches(['/', '\\']))
    } else {
        path.to_path_buf()
    }
}

/// Process-wide "resources root" — the application's own bundled resources
/// directory, set once at startup by the embedding application. A folder
/// path inside it is always unsafe (spec.md §4.1(c)).
static RESOURCES_ROOT: std::sync::OnceLock<PathBuf> = std::sync::OnceLock::new();

/// Set the resources root. Intended to be called at most once, at process
/// startup; later calls are ignored (mirrors `OnceLock` semantics — the
/// first caller wins).
pub fn set_resources_root(path: PathBuf) {
    let _ = RESOURCES_ROOT.set(path);
}

fn segment_count(path: &Path) -> usize {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::RootDir | std::path::Component::Prefix(_)))
        .count()
}

/// Check whether a (pre-normalized) path is safe to register as a folder
/// root. Evaluates every rule in spec.md §4.1 and returns the first
/// violation found, or `Verdict::Safe`.
pub fn check(path: &Path) -> Verdict {
    let s = path.to_string_lossy();

    if path == Path::new("/") || path.as_os_str().is_empty() {
        return Verdict::Unsafe("Cannot sync the filesystem root — choose a specific project folder instead.".into());
    }

    // Windows drive root, e.g. "C:\" or "C:/"
    if is_windows_drive_root(&s) {
        return Verdict::Unsafe("Cannot sync a drive root — choose a specific project folder instead.".into());
    }

    for entry in UNIX_BLOCKLIST {
        if let Some(depth_beyond) = depth_beyond_unix_entry(&s, entry) {
            // A path nested ≥2 segments below a blocklisted root (e.g.
            // "/Users/alice/proj") is a legitimate project folder, not the
            // system directory itself — spec.md §8 scenario 1. Only the
            // bare entry or a shallow child of it is rejected here.
            if depth_beyond < 2 {
                return Verdict::Unsafe(format!(
                    "Cannot sync {entry} or its contents — this is a system directory."
                ));
            }
        }
    }

    for entry in WINDOWS_BLOCKLIST {
        if let Some(depth_beyond) = windows_depth_beyond(&s, entry) {
            if depth_beyond < 2 {
                return Verdict::Unsafe(format!(
                    "Cannot sync {entry} or its contents — this is a system directory."
                ));
            }
        }
    }

    if let Some(resources_root) = RESOURCES_ROOT.get() {
        if path.starts_with(resources_root) {
            return Verdict::Unsafe(
                "Cannot sync the application's own resources directory.".into(),
            );
        }
    }

    if segment_count(path) < 2 {
        return Verdict::Unsafe(
            "This folder is too close to the filesystem root — choose a deeper, more specific folder."
                .into(),
        );
    }

    Verdict::Safe
}

fn is_windows_drive_root(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() <= 3
        && bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'\\' || bytes[2] == b'/')
}

/// If `s` is `entry` itself or nested inside it, returns how many path
/// segments lie beyond `entry` (0 if `s == entry`). Returns `None` if `s`
/// is not under `entry` at all.
fn depth_beyond_unix_entry(s: &str, entry: &str) -> Option<usize> {
    if s == entry {
        return Some(0);
    }
    let prefix = format!("{entry}/");
    s.strip_prefix(&prefix)
        .or_else(|| s.strip_prefix(&format!("{entry}\\")))
        .map(|rest| rest.split(['/', '\\']).filter(|seg| !seg.is_empty()).count())
}

/// Windows equivalent: matches the segment right after the drive letter
/// case-insensitively, then counts segments beyond it.
fn windows_depth_beyond(s: &str, entry: &str) -> Option<usize> {
    let normalized = s.replace('\\', "/");
    let after_drive = normalized.splitn(2, ":/").nth(1)?;
    let mut segments = after_drive.split('/').filter(|seg| !seg.is_empty());
    let first_segment = segments.next()?;
    if !first_segment.eq_ignore_ascii_case(entry) {
        return None;
    }
    Some(segments.count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_filesystem_root() {
        assert!(!check(Path::new("/")).is_safe());
    }

    #[test]
    fn rejects_shallow_path() {
        assert!(!check(Path::new("/a")).is_safe());
    }

    #[test]
    fn rejects_unix_blocklist_bare_and_shallow_children() {
        for entry in UNIX_BLOCKLIST {
            assert!(!check(Path::new(entry)).is_safe(), "expected bare {entry} to be unsafe");
            let shallow = PathBuf::from(entry).join("sub");
            assert!(!check(&shallow).is_safe(), "expected shallow {entry}/sub to be unsafe");
        }
    }

    #[test]
    fn accepts_deep_enough_path_under_blocklisted_root() {
        // spec.md §8 scenario 1: two segments deep under the blocklisted
        // /Users is a legitimate project folder and must be accepted.
        assert!(check(Path::new("/Users/alice/proj")).is_safe());
    }

    #[test]
    fn accepts_ordinary_project_path() {
        assert!(check(Path::new("/home/alice/projects/widget")).is_safe());
    }

    #[test]
    fn rejects_windows_drive_root() {
        assert!(!check(Path::new("C:\\")).is_safe());
    }

    #[test]
    fn rejects_windows_blocklist() {
        assert!(!check(Path::new("C:\\Windows\\System32")).is_safe());
        assert!(!check(Path::new("C:\\Program Files\\Foo")).is_safe());
    }

    #[test]
    fn normalize_strips_trailing_separator() {
        let n = normalize(Path::new("/home/alice/proj/"));
        assert_eq!(n, PathBuf::from("/home/alice/proj"));
    }
}
