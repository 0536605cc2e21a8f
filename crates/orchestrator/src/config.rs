//! Engine configuration (spec.md §6 `SettingsStore`, concretized).
//!
//! A `toml`-backed config file, in the style of the teacher's own
//! `.codescope.toml` (`server/src/init.rs`): defaults baked into
//! [`EngineConfig::default`], overridden by `[engine]` keys in a config
//! file if one is present, and finally by process environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Resolved, immutable settings the rest of the crate reads. Implements
/// [`crate::capabilities::SettingsStore`] directly so the CLI/tests can
/// hand it straight to [`crate::engine::Engine::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub vector_db_enabled: bool,
    pub vector_sync_interval_minutes: u32,
    pub vector_auto_sync_enabled: bool,
    pub embedding_provider_is_local: bool,
    pub hybrid_search_enabled: bool,
    pub default_max_file_size_bytes: u64,
    pub default_max_file_lines: usize,
    pub default_max_line_length: usize,
    /// Folders with `status=syncing` whose `updated_at` is older than this
    /// are considered stuck by recovery (spec.md §4.9 step 2).
    pub recovery_stale_minutes: i64,
    /// Folders whose `last_synced_at` is older than this are "stale" for
    /// the default `sync_stale_folders` sweep (spec.md §4.9 step 6).
    pub default_stale_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vector_db_enabled: true,
            vector_sync_interval_minutes: 5,
            vector_auto_sync_enabled: true,
            embedding_provider_is_local: true,
            hybrid_search_enabled: true,
            default_max_file_size_bytes: 10 * 1024 * 1024,
            default_max_file_lines: 20_000,
            default_max_line_length: 10_000,
            recovery_stale_minutes: 30,
            default_stale_minutes: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TomlFile {
    #[serde(default)]
    engine: EngineConfig,
}

impl EngineConfig {
    /// Load from a `.folderindex.toml`-shaped file under an `[engine]`
    /// table, falling back to defaults if the file is absent or
    /// unparsable — matching the teacher's tolerant `.codescope.toml`
    /// loading in `server/src/init.rs`.
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|content| toml::from_str::<TomlFile>(&content).ok())
            .map(|f| f.engine)
            .unwrap_or_default()
    }

    pub fn scheduler_interval_minutes(&self) -> u32 {
        self.vector_sync_interval_minutes.max(5)
    }
}

impl crate::capabilities::SettingsStore for EngineConfig {
    fn vector_db_enabled(&self) -> bool {
        self.vector_db_enabled
    }
    fn vector_sync_interval_minutes(&self) -> u32 {
        self.vector_sync_interval_minutes
    }
    fn vector_auto_sync_enabled(&self) -> bool {
        self.vector_auto_sync_enabled
    }
    fn embedding_provider_is_local(&self) -> bool {
        self.embedding_provider_is_local
    }
    fn hybrid_search_enabled(&self) -> bool {
        self.hybrid_search_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = EngineConfig::load(Path::new("/nonexistent/path.toml"));
        assert_eq!(cfg.vector_sync_interval_minutes, 5);
    }

    #[test]
    fn scheduler_interval_is_clamped_to_five_minutes() {
        let mut cfg = EngineConfig::default();
        cfg.vector_sync_interval_minutes = 1;
        assert_eq!(cfg.scheduler_interval_minutes(), 5);
    }

    #[test]
    fn parses_engine_table_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(&path, "[engine]\nvector_sync_interval_minutes = 42\n").unwrap();
        let cfg = EngineConfig::load(&path);
        assert_eq!(cfg.vector_sync_interval_minutes, 42);
    }
}
