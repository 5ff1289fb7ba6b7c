//! Offline reconciliation.
//!
//! While the daemon is stopped or disconnected, the local tree and the
//! remote drift apart silently. On every transition back to running, the
//! orchestrator snapshots the local root and synthesizes the events the
//! watcher would have produced: paths whose ctime or mtime passed the
//! last-sync stamp become `Modified` (if tracked) or `Created` (if not),
//! and tracked paths missing from the snapshot become `Deleted`. The
//! synthesized events flow through the same queue and upload pipeline as
//! live ones.

use std::sync::Arc;

use nimbus_core::RemoteClient;
use tracing::debug;

use crate::events::FileEvent;
use crate::snapshot::DirectorySnapshot;

/// Synthesize the local changes made since `last_sync`.
///
/// A path never produces both a `Created` and a `Deleted`: creations come
/// from snapshot entries and deletions from index entries absent in the
/// snapshot.
pub async fn local_changes_since(
    client: &Arc<dyn RemoteClient>,
    snapshot: &DirectorySnapshot,
    last_sync: f64,
) -> Vec<FileEvent> {
    let mut changes = Vec::new();

    for path in snapshot.paths() {
        let Some(stat) = snapshot.stat_info(path) else {
            continue;
        };
        if stat.changed_at() <= last_sync {
            continue;
        }
        let remote_path = client.to_remote_path(path);
        let tracked = client.get_local_rev(&remote_path).await.is_some();
        let event = if tracked {
            FileEvent::modified(path, stat.is_dir)
        } else {
            FileEvent::created(path, stat.is_dir)
        };
        debug!(kind = ?event.kind, path = %path.display(), "offline change");
        changes.push(event);
    }

    for (remote_path, rev) in client.rev_index().await {
        let local_path = client.to_local_path(&remote_path);
        if !snapshot.contains_case_normalized(&local_path) {
            debug!(path = %local_path.display(), "offline deletion");
            changes.push(FileEvent::deleted(local_path, rev.is_folder()));
        }
    }

    changes
}
