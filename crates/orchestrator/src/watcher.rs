//! Per-folder file watcher (spec.md §4.8).
//!
//! Generalizes the teacher's single global watcher (`server/src/watch.rs`:
//! one `RecommendedWatcher`, one `std::sync::mpsc` channel, one debounce
//! thread) into one watcher per folder, each independently claimed,
//! debounced, and torn down.

use crate::deps::Deps;
use crate::error::{Error, Result};
use crate::mode;
use crate::pipeline;
use crate::state::WatcherHealth;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use folderindex_core::ignore_match::{aggressive_matcher, PatternMatcher};
use folderindex_core::{FolderRecord, FolderStatus};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{info, warn};
use uuid::Uuid;

/// Debounce window between the last observed change and a batch run
/// (spec.md §4.8 "Batched change handling").
const DEBOUNCE: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const PERMISSION_ERROR_LIMIT: usize = 10;
const EMFILE_RETRY_LIMIT: usize = 3;
const EMFILE_BACKOFFS: [Duration; 3] =
    [Duration::from_secs(3), Duration::from_secs(10), Duration::from_secs(30)];

struct ActiveWatcher {
    stop: Arc<AtomicBool>,
    // The `notify` watcher itself lives inside the debounce thread (it owns
    // the only handle capable of adding watches for newly created
    // subdirectories); keeping the thread alive keeps the OS subscription
    // alive, and the thread drops the watcher on its way out.
    _thread: std::thread::JoinHandle<()>,
}

/// Live per-folder watcher handles, owned by the engine facade alongside
/// [`crate::state::EngineState`] (spec.md §9: the watcher claim lives for
/// the process's lifetime, same as the rest of the in-memory state).
#[derive(Default)]
pub struct WatcherRegistry {
    active: DashMap<Uuid, ActiveWatcher>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_watching(&self, folder_id: Uuid) -> bool {
        self.active.contains_key(&folder_id)
    }

    pub fn stop(&self, deps: &Deps, folder_id: Uuid, folder_path: &str) {
        if let Some((_, handle)) = self.active.remove(&folder_id) {
            handle.stop.store(true, Ordering::SeqCst);
            // The watcher is dropped here, closing the OS subscription.
        }
        if let Some(entry) = deps.state.watching_paths.get(folder_path) {
            if *entry == folder_id {
                drop(entry);
                deps.state.watching_paths.remove(folder_path);
            }
        }
    }

    pub fn stop_all(&self, deps: &Deps) {
        let ids: Vec<Uuid> = self.active.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Ok(Some(folder)) = deps.ledger.get_folder(id) {
                self.stop(deps, id, &folder.folder_path);
            } else {
                self.active.remove(&id);
            }
        }
    }

    /// Start a watcher for `folder`, claiming its normalized path
    /// synchronously (spec.md §4.8 "acquire the `watching_paths` claim
    /// synchronously").
    pub fn start(self: &Arc<Self>, deps: &Deps, folder: FolderRecord, polling_hint: bool) -> Result<()> {
        let folder_id = folder.folder_id;
        let path = folder.folder_path.clone();

        match deps.state.watching_paths.entry(path.clone()) {
            Entry::Occupied(entry) if *entry.get() != folder_id => {
                // A different folder already claims this path (spec.md
                // §4.8: "record the claim conflict, mark the folder
                // synced, and return without creating a watcher").
                drop(entry);
                deps.ledger.set_status(folder_id, FolderStatus::Synced, None)?;
                return Ok(());
            }
            Entry::Occupied(_) => return Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(folder_id);
            }
        }

        if self.active.contains_key(&folder_id) {
            return Ok(());
        }

        let active = match self.spawn_watcher(deps, &folder, polling_hint) {
            Ok(active) => active,
            Err(e) => {
                deps.state.watching_paths.remove(&path);
                return Err(e);
            }
        };
        self.active.insert(folder_id, active);
        Ok(())
    }

    /// Tear down the broken watcher for `folder` (already gone by the time
    /// this runs — its thread has exited) and start a fresh one in polling
    /// mode (spec.md §4.8 scenario 5: "closes it, sleeps, restarts in
    /// polling mode"). Called from the dying debounce thread itself after
    /// its backoff sleep.
    fn restart_polling(self: &Arc<Self>, deps: &Deps, folder: FolderRecord) {
        let folder_id = folder.folder_id;
        let path = folder.folder_path.clone();
        self.active.remove(&folder_id);
        match self.spawn_watcher(deps, &folder, true) {
            Ok(active) => {
                self.active.insert(folder_id, active);
            }
            Err(e) => {
                warn!(folder = %folder_id, error = %e, "failed to restart watcher in polling mode");
                deps.state.watching_paths.remove(&path);
            }
        }
    }

    fn spawn_watcher(
        self: &Arc<Self>,
        deps: &Deps,
        folder: &FolderRecord,
        polling_hint: bool,
    ) -> Result<ActiveWatcher> {
        let (tx, rx) = std_mpsc::channel::<notify::Result<Event>>();
        let config = if polling_hint {
            notify::Config::default().with_poll_interval(POLL_INTERVAL)
        } else {
            notify::Config::default()
        };
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            config,
        )
        .map_err(|e| Error::RunFailed(format!("failed to create watcher: {e}")))?;

        // Walk the tree ourselves and watch each non-excluded directory
        // non-recursively, rather than handing the whole subtree to
        // `notify`'s own recursive mode (spec.md §4.2: the aggressive
        // matcher "is what the filesystem watcher uses because it must
        // reject these paths before the OS opens a descriptor for them" —
        // a single recursive `watch()` call would let the OS backend add a
        // descriptor per subdirectory, including excluded ones, before we
        // ever get a say).
        let root = PathBuf::from(&folder.folder_path);
        for dir in watch_dirs(&root, &folder.exclude_patterns, folder.recursive) {
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| Error::RunFailed(format!("failed to watch {}: {e}", dir.display())))?;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let handle = Handle::current();
        let deps = deps.clone();
        let folder = folder.clone();
        let thread_stop = stop.clone();
        let registry = self.clone();
        let thread = std::thread::spawn(move || {
            debounce_loop(rx, handle, deps, folder, thread_stop, watcher, registry);
        });

        Ok(ActiveWatcher { stop, _thread: thread })
    }
}

/// Every directory under `root` (itself included) that should get its own
/// watch, pruning the aggressive excludes and the folder's own
/// `exclude_patterns` before descending. Non-recursive folders watch only
/// the root.
fn watch_dirs(root: &Path, exclude_patterns: &[String], recursive: bool) -> Vec<PathBuf> {
    let mut dirs = vec![root.to_path_buf()];
    if !recursive {
        return dirs;
    }
    let aggressive = aggressive_matcher();
    let user = PatternMatcher::new(exclude_patterns, root);
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let path_str = path.to_string_lossy().replace('\\', "/");
            if aggressive.is_excluded(&path_str) || user.is_excluded(&path_str) {
                continue;
            }
            dirs.push(path.clone());
            stack.push(path);
        }
    }
    dirs
}

fn classify_io_error(err: &notify::Error) -> Option<i32> {
    match &err.kind {
        notify::ErrorKind::Io(io_err) => io_err.raw_os_error(),
        _ => None,
    }
}

const EACCES: i32 = 13;
const EPERM: i32 = 1;
const EMFILE: i32 = 24;
const EBADF: i32 = 9;

fn debounce_loop(
    rx: std_mpsc::Receiver<notify::Result<Event>>,
    handle: Handle,
    deps: Deps,
    folder: FolderRecord,
    stop: Arc<AtomicBool>,
    mut watcher: RecommendedWatcher,
    registry: Arc<WatcherRegistry>,
) {
    let folder_id = folder.folder_id;
    let health = deps.state.health_for(folder_id);
    let running = Arc::new(AtomicBool::new(false));
    let mut pending_rerun = false;
    let mut last_change: Option<Instant> = None;
    let aggressive = aggressive_matcher();
    let user = PatternMatcher::new(&folder.exclude_patterns, Path::new(&folder.folder_path));
    let mut restart_backoff: Option<Duration> = None;

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(event)) => {
                if let Some(os_code) = event_error_hint(&event) {
                    if let OsErrorOutcome::RestartPolling(backoff) =
                        handle_os_error(&deps, &folder, &health, os_code, &stop)
                    {
                        restart_backoff = Some(backoff);
                    }
                    continue;
                }
                watch_new_directories(&mut watcher, &folder, &aggressive, &user, &event);
                on_event(&deps, &folder, event);
                last_change = Some(Instant::now());
            }
            Ok(Err(e)) => {
                if let Some(code) = classify_io_error(&e) {
                    if let OsErrorOutcome::RestartPolling(backoff) =
                        handle_os_error(&deps, &folder, &health, code, &stop)
                    {
                        restart_backoff = Some(backoff);
                    }
                } else {
                    warn!(folder = %folder_id, error = %e, "watcher event stream error");
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if stop.load(Ordering::SeqCst) {
            break;
        }

        let due = last_change.map(|t| t.elapsed() >= DEBOUNCE).unwrap_or(false);
        if due {
            last_change = None;
            if running.load(Ordering::SeqCst) {
                pending_rerun = true;
                continue;
            }
            fire_batch(&handle, &deps, &folder, &running);
        } else if pending_rerun && !running.load(Ordering::SeqCst) {
            pending_rerun = false;
            fire_batch(&handle, &deps, &folder, &running);
        }
    }
    // Close the watcher before sleeping or restarting (spec.md §4.8
    // scenario 5: "closes it, sleeps Ns, restarts in polling mode").
    drop(watcher);

    if let Some(backoff) = restart_backoff {
        info!(folder = %folder_id, ?backoff, "watcher closed after EMFILE, backing off before polling restart");
        std::thread::sleep(backoff);
        registry.restart_polling(&deps, folder);
    }
}

/// When a new directory appears under a recursive folder, add a
/// non-recursive watch for it (and any subdirectories it was created with
/// already populated) unless it matches the aggressive or user exclude set
/// — the same pruning `spawn_watcher`'s initial walk applies (spec.md
/// §4.2).
fn watch_new_directories(
    watcher: &mut RecommendedWatcher,
    folder: &FolderRecord,
    aggressive: &PatternMatcher,
    user: &PatternMatcher,
    event: &Event,
) {
    if !folder.recursive || !matches!(event.kind, EventKind::Create(_)) {
        return;
    }
    for path in &event.paths {
        if !path.is_dir() {
            continue;
        }
        let path_str = path.to_string_lossy().replace('\\', "/");
        if aggressive.is_excluded(&path_str) || user.is_excluded(&path_str) {
            continue;
        }
        for dir in watch_dirs(path, &folder.exclude_patterns, true) {
            let _ = watcher.watch(&dir, RecursiveMode::NonRecursive);
        }
    }
}

/// `notify` surfaces most fatal conditions (EMFILE, EACCES) as `Err` on the
/// channel rather than inside an `Ok(Event)`; this hook exists for the rare
/// backend that reports them as an event-level error instead.
fn event_error_hint(_event: &Event) -> Option<i32> {
    None
}

fn fire_batch(handle: &Handle, deps: &Deps, folder: &FolderRecord, running: &Arc<AtomicBool>) {
    running.store(true, Ordering::SeqCst);
    let deps = deps.clone();
    let folder = folder.clone();
    let running = running.clone();
    handle.spawn(async move {
        run_batch(&deps, &folder).await;
        running.store(false, Ordering::SeqCst);
    });
}

fn on_event(deps: &Deps, folder: &FolderRecord, event: Event) {
    let folder_id = folder.folder_id;
    match event.kind {
        EventKind::Remove(_) => {
            for path in event.paths {
                let path_str = path.to_string_lossy().to_string();
                let deps = deps.clone();
                let folder_id = folder_id;
                tokio::spawn(async move {
                    let _ = remove_file(&deps, folder_id, &path_str).await;
                });
            }
        }
        EventKind::Create(_) | EventKind::Modify(_) => {
            for path in event.paths {
                if path.is_dir() {
                    continue;
                }
                let path_str = path.to_string_lossy().to_string();
                let deferred = deps.state.active_chat_runs(folder.agent_id) > 0;
                deps.state.enqueue(folder_id, path_str, deferred);
            }
        }
        _ => {}
    }
}

/// What the debounce loop should do once it returns control after an OS
/// error. Both `Paused` and `RestartPolling` tear down the current watcher
/// (by setting `stop`); the distinction is whether the thread sleeps and
/// respawns in polling mode afterward, or the folder just stays paused.
enum OsErrorOutcome {
    Continue,
    Paused,
    RestartPolling(Duration),
}

fn handle_os_error(
    deps: &Deps,
    folder: &FolderRecord,
    health: &Arc<WatcherHealth>,
    os_code: i32,
    stop: &Arc<AtomicBool>,
) -> OsErrorOutcome {
    let folder_id = folder.folder_id;
    match os_code {
        EACCES | EPERM => {
            let count = health.permission_error_count.fetch_add(1, Ordering::SeqCst) + 1;
            if count >= PERMISSION_ERROR_LIMIT {
                stop.store(true, Ordering::SeqCst);
                let _ = deps.ledger.set_status(
                    folder_id,
                    FolderStatus::Paused,
                    Some("Watcher stopped after repeated permission errors."),
                );
                OsErrorOutcome::Paused
            } else {
                OsErrorOutcome::Continue
            }
        }
        EMFILE | EBADF => {
            health.polling_mode.store(true, Ordering::SeqCst);
            let count = health.emfile_retry_count.fetch_add(1, Ordering::SeqCst) + 1;
            if count > EMFILE_RETRY_LIMIT {
                stop.store(true, Ordering::SeqCst);
                let _ = deps.ledger.set_status(
                    folder_id,
                    FolderStatus::Paused,
                    Some("Watcher stopped after repeated file-descriptor exhaustion."),
                );
                OsErrorOutcome::Paused
            } else {
                let backoff = EMFILE_BACKOFFS[(count - 1).min(EMFILE_BACKOFFS.len() - 1)];
                // Tear down this watcher now; the caller sleeps and
                // respawns in polling mode only after it's actually
                // closed (spec.md §4.8 scenario 5).
                stop.store(true, Ordering::SeqCst);
                OsErrorOutcome::RestartPolling(backoff)
            }
        }
        _ => OsErrorOutcome::Continue,
    }
}

/// Run one debounced batch for `folder`: the per-file algorithm from
/// spec.md §4.7 steps 8b-8g over whatever paths are currently queued,
/// with mode resolution re-applied per spec.md §4.8 ("config may have
/// changed").
async fn run_batch(deps: &Deps, folder: &FolderRecord) {
    let current = match deps.ledger.get_folder(folder.folder_id) {
        Ok(Some(f)) => f,
        _ => return,
    };
    let behavior = mode::resolve(&current, deps.settings.vector_db_enabled());
    if !behavior.allows_watcher_events {
        return;
    }

    let paths = deps.state.drain_queue(current.folder_id);
    if paths.is_empty() {
        return;
    }

    let cancel = crate::state::CancelHandle::new();
    let mut indexed = 0usize;
    for path in paths {
        let abs = Path::new(&path);
        if !abs.exists() {
            let _ = remove_file(deps, current.folder_id, &path).await;
            continue;
        }
        let relative_path = abs
            .strip_prefix(&current.folder_path)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| path.clone());
        let outcome =
            pipeline::process_file(deps, &current, &behavior, abs, &relative_path, false, &cancel)
                .await;
        if matches!(
            outcome,
            pipeline::FileOutcome::Indexed { .. } | pipeline::FileOutcome::FilesOnlyIndexed
        ) {
            indexed += 1;
        }
    }

    if indexed > 0 {
        if let Ok((file_count, chunk_count)) = deps.ledger.recompute_counts(current.folder_id) {
            let _ = deps.ledger.update_progress(current.folder_id, file_count, chunk_count);
        }
    }
}

/// `remove_file` (spec.md §4.7 "remove_file(path) (watcher-initiated)").
pub async fn remove_file(deps: &Deps, folder_id: Uuid, file_path: &str) -> Result<()> {
    let folder = deps.ledger.get_folder(folder_id)?.ok_or(Error::FolderNotFound(folder_id))?;
    if let Some(removed) = deps.ledger.delete_file_by_path(folder_id, file_path)? {
        if !removed.vector_point_ids.is_empty() {
            deps.vector_store.delete_by_ids(folder.agent_id, &removed.vector_point_ids)?;
        }
    }
    if let Some(queue) = deps.state.folder_queues.get(&folder_id) {
        queue.remove(file_path);
    }
    if let Some(queue) = deps.state.deferred_queues.get(&folder_id) {
        queue.remove(file_path);
    }
    Ok(())
}

/// Move every deferred path for `agent_id` into its ready queue and kick a
/// batch for each affected folder — called when the task-registry
/// capability reports the agent's active chat-run count reaching zero
/// (spec.md §4.8 "Chat-run coordination").
pub fn promote_deferred(handle: &Handle, deps: &Deps, folder_ids: &[Uuid]) {
    deps.state.promote_deferred_for_agent(folder_ids);
    for folder_id in folder_ids {
        let deps = deps.clone();
        let folder_id = *folder_id;
        handle.spawn(async move {
            if let Ok(Some(folder)) = deps.ledger.get_folder(folder_id) {
                run_batch(&deps, &folder).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::watch_dirs;
    use std::fs;

    #[test]
    fn watch_dirs_prunes_aggressive_and_user_excludes() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("src")).unwrap();
        fs::create_dir_all(root.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.path().join("build")).unwrap();
        fs::create_dir_all(root.path().join("vendor")).unwrap();

        let dirs = watch_dirs(root.path(), &["vendor".to_string()], true);
        let names: Vec<String> = dirs
            .iter()
            .map(|d| d.strip_prefix(root.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert!(names.contains(&"".to_string()) || names.contains(&"src".to_string()));
        assert!(names.iter().any(|n| n == "src"));
        assert!(!names.iter().any(|n| n.contains("node_modules")));
        assert!(!names.iter().any(|n| n.contains("build")));
        assert!(!names.iter().any(|n| n.contains("vendor")));
    }

    #[test]
    fn watch_dirs_non_recursive_returns_only_root() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("src")).unwrap();

        let dirs = watch_dirs(root.path(), &[], false);
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0], root.path());
    }
}
