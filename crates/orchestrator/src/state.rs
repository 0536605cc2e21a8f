//! Process-wide in-memory state (spec.md §3 "In-memory state", §9
//! "Ownership/locking").
//!
//! In the source this lives on a process-wide object so it survives
//! development hot-reload; here it simply lives inside [`EngineState`],
//! owned by the [`crate::engine::Engine`] singleton whose lifecycle already
//! matches the process (spec.md §9). Every map uses `dashmap`, the
//! teacher's own choice for shared concurrent maps (`crates/core`'s stub
//! cache, `server`'s MCP session table).

use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// A cooperative cancellation flag for one sync run. Cheap to clone and
/// share between the run's task and whatever requests cancellation
/// (folder removal, a duplicate-path takeover, an external API call).
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-folder resilience counters and mode flags tracked by the watcher
/// (spec.md §4.8 "Resilience").
#[derive(Default)]
pub struct WatcherHealth {
    pub permission_error_count: AtomicUsize,
    pub emfile_retry_count: AtomicUsize,
    pub polling_mode: AtomicBool,
}

/// All process-wide mutable state the orchestrator coordinates over.
/// Registered under two indexes for cancellation — `by_folder_id` and
/// `by_path` — mutated under the same ownership-claim path that starts and
/// stops a run (spec.md §9 "Ownership/locking").
pub struct EngineState {
    /// Folder IDs with a live sync run.
    pub syncing_folders: DashSet<Uuid>,
    /// Normalized path -> (folder_id, cancel handle), to detect duplicate
    /// runs across folder-id churn (two folder rows pointing at the same
    /// path).
    pub syncing_paths: DashMap<String, (Uuid, CancelHandle)>,
    /// Normalized path -> folder_id: single-watcher claim per path.
    pub watching_paths: DashMap<String, Uuid>,
    /// folder_id -> set of file paths ready to index.
    pub folder_queues: DashMap<Uuid, DashSet<String>>,
    /// folder_id -> set of file paths deferred behind an active chat run.
    pub deferred_queues: DashMap<Uuid, DashSet<String>>,
    /// agent_id -> count of active chat/generation runs.
    pub active_chat_runs_by_agent: DashMap<Uuid, usize>,
    /// folder_id -> watcher resilience counters.
    pub watcher_health: DashMap<Uuid, Arc<WatcherHealth>>,
    /// Guards `sync_folder`'s ownership transfer (§4.7 step 3) so two
    /// concurrent callers can't both observe "not syncing yet" for the
    /// same path and both proceed.
    pub ownership_lock: tokio::sync::Mutex<()>,
    /// Background scheduler "in progress" flag (spec.md §4.9 step 6).
    pub scheduler_in_progress: AtomicBool,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            syncing_folders: DashSet::new(),
            syncing_paths: DashMap::new(),
            watching_paths: DashMap::new(),
            folder_queues: DashMap::new(),
            deferred_queues: DashMap::new(),
            active_chat_runs_by_agent: DashMap::new(),
            watcher_health: DashMap::new(),
            ownership_lock: tokio::sync::Mutex::new(()),
            scheduler_in_progress: AtomicBool::new(false),
        }
    }

    pub fn is_syncing(&self, folder_id: Uuid) -> bool {
        self.syncing_folders.contains(&folder_id)
    }

    pub fn active_chat_runs(&self, agent_id: Uuid) -> usize {
        self.active_chat_runs_by_agent.get(&agent_id).map(|c| *c).unwrap_or(0)
    }

    /// Increment the agent's active-chat-run counter (spec.md §4.8
    /// "Chat-run coordination": "On started for a chat task, increment the
    /// agent's counter").
    pub fn begin_chat_run(&self, agent_id: Uuid) -> usize {
        let mut entry = self.active_chat_runs_by_agent.entry(agent_id).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Decrement the counter, saturating at zero. Returns the new count so
    /// the caller can decide whether to promote deferred files.
    pub fn end_chat_run(&self, agent_id: Uuid) -> usize {
        let mut entry = self.active_chat_runs_by_agent.entry(agent_id).or_insert(0);
        if *entry > 0 {
            *entry -= 1;
        }
        *entry
    }

    pub fn enqueue(&self, folder_id: Uuid, path: String, deferred: bool) {
        let map = if deferred { &self.deferred_queues } else { &self.folder_queues };
        map.entry(folder_id).or_insert_with(DashSet::new).insert(path);
    }

    pub fn drain_queue(&self, folder_id: Uuid) -> Vec<String> {
        match self.folder_queues.get(&folder_id) {
            Some(set) => {
                let items: Vec<String> = set.iter().map(|p| p.clone()).collect();
                set.clear();
                items
            }
            None => Vec::new(),
        }
    }

    /// Move every deferred path for `agent_id`'s folders into its ready
    /// queue (spec.md §4.8 "Chat-run coordination").
    pub fn promote_deferred_for_agent(&self, folder_ids: &[Uuid]) {
        for folder_id in folder_ids {
            if let Some((_, deferred)) = self.deferred_queues.remove(folder_id) {
                let queue = self.folder_queues.entry(*folder_id).or_insert_with(DashSet::new);
                for path in deferred.iter() {
                    queue.insert(path.clone());
                }
            }
        }
    }

    pub fn health_for(&self, folder_id: Uuid) -> Arc<WatcherHealth> {
        self.watcher_health.entry(folder_id).or_insert_with(|| Arc::new(WatcherHealth::default())).clone()
    }

    pub fn clear_folder_state(&self, folder_id: Uuid) {
        self.syncing_folders.remove(&folder_id);
        self.folder_queues.remove(&folder_id);
        self.deferred_queues.remove(&folder_id);
        self.watcher_health.remove(&folder_id);
        self.syncing_paths.retain(|_, (fid, _)| *fid != folder_id);
        self.watching_paths.retain(|_, fid| *fid != folder_id);
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_deferred_moves_all_paths() {
        let state = EngineState::new();
        let folder = Uuid::new_v4();
        state.enqueue(folder, "a.md".into(), true);
        state.enqueue(folder, "b.md".into(), true);

        state.promote_deferred_for_agent(&[folder]);

        let mut drained = state.drain_queue(folder);
        drained.sort();
        assert_eq!(drained, vec!["a.md".to_string(), "b.md".to_string()]);
        assert!(state.deferred_queues.get(&folder).is_none());
    }

    #[test]
    fn chat_run_counter_tracks_started_and_completed() {
        let state = EngineState::new();
        let agent = Uuid::new_v4();
        assert_eq!(state.active_chat_runs(agent), 0);

        assert_eq!(state.begin_chat_run(agent), 1);
        assert_eq!(state.begin_chat_run(agent), 2);
        assert_eq!(state.end_chat_run(agent), 1);
        assert_eq!(state.end_chat_run(agent), 0);
        // Doesn't go negative on an extra completion.
        assert_eq!(state.end_chat_run(agent), 0);
    }

    #[test]
    fn cancel_handle_reflects_across_clones() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }
}
