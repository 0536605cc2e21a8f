//! Folder/agent lifecycle operations outside the per-run sync algorithm:
//! removal, reindexing, and primary-folder promotion (spec.md §4.7
//! "remove_folder", "remove_file", "Reindex").

use crate::deps::Deps;
use crate::error::{Error, Result};
use crate::sync::sync_folder;
use crate::watcher::{self, WatcherRegistry};
use folderindex_core::{FolderStatus, SyncTrigger};
use std::time::Duration;
use uuid::Uuid;

/// Remove a folder: pause it, cancel any active sync, stop its watcher,
/// drop its vectors, delete its ledger rows, and promote a new primary if
/// needed.
pub async fn remove_folder(deps: &Deps, watchers: &WatcherRegistry, folder_id: Uuid) -> Result<()> {
    let folder = deps.ledger.get_folder(folder_id)?.ok_or(Error::FolderNotFound(folder_id))?;

    deps.ledger.set_status(folder_id, FolderStatus::Paused, Some("Removing\u{2026}"))?;

    if let Some(entry) = deps.state.syncing_paths.get(&folder.folder_path) {
        if entry.0 == folder_id {
            entry.1.cancel();
            drop(entry);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    watchers.stop(deps, folder_id, &folder.folder_path);

    let remaining_for_agent = deps.ledger.count_folders_for_agent(folder.agent_id)?;
    if remaining_for_agent <= 1 {
        deps.vector_store.drop_table(folder.agent_id)?;
    } else {
        deps.vector_store.delete_by_folder(folder.agent_id, folder_id)?;
    }

    deps.ledger.delete_folder(folder_id)?;

    if folder.is_primary {
        if let Some(oldest) = deps.ledger.oldest_folder_for_agent(folder.agent_id)? {
            deps.ledger.set_primary(oldest.folder_id, folder.agent_id)?;
            deps.events.publish(crate::events::FolderEvent::PrimaryChanged {
                folder_id: oldest.folder_id,
                agent_id: folder.agent_id,
            });
        }
    }

    deps.state.clear_folder_state(folder_id);
    deps.events
        .publish(crate::events::FolderEvent::Removed { folder_id, agent_id: folder.agent_id });
    Ok(())
}

/// `remove_file(path)` (watcher-initiated file deletion), re-exported here
/// since it is part of the folder/file lifecycle surface even though its
/// implementation lives next to the watcher that calls it most often.
pub async fn remove_file(deps: &Deps, folder_id: Uuid, file_path: &str) -> Result<()> {
    watcher::remove_file(deps, folder_id, file_path).await
}

/// Drop the agent's vector table and re-run every one of its folders with
/// `force=true` (spec.md §4.7 "Reindex").
pub async fn reindex_agent(deps: &Deps, agent_id: Uuid) -> Result<Vec<Result<()>>> {
    deps.vector_store.drop_table(agent_id)?;
    let folders = deps.ledger.get_folders_for_agent(agent_id)?;
    let mut results = Vec::with_capacity(folders.len());
    for folder in folders {
        let outcome =
            sync_folder(deps, folder.folder_id, None, true, SyncTrigger::Manual).await.map(|_| ());
        results.push(outcome);
    }
    Ok(results)
}

/// Reindex every agent that has at least one folder.
pub async fn reindex_all(deps: &Deps) -> Result<()> {
    let folders = deps.ledger.get_all_folders()?;
    let mut seen = std::collections::HashSet::new();
    for folder in folders {
        if seen.insert(folder.agent_id) {
            reindex_agent(deps, folder.agent_id).await?;
        }
    }
    Ok(())
}

/// Set a folder as its agent's primary (thin wrapper so callers go through
/// the orchestrator's public surface rather than the ledger directly).
pub fn set_primary(deps: &Deps, folder_id: Uuid, agent_id: Uuid) -> Result<()> {
    deps.ledger.set_primary(folder_id, agent_id)?;
    deps.events.publish(crate::events::FolderEvent::PrimaryChanged { folder_id, agent_id });
    Ok(())
}
