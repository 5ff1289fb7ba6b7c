//! Upload worker: local events out to the remote.
//!
//! The worker drains the local queue in debounced batches: it blocks for
//! the first event, then keeps sleeping until the watcher has been quiet
//! for the debounce window, then drains whatever accumulated. The batch
//! is coalesced (see [`crate::batch`]) and dispatched concurrently while
//! holding the sync lock. Only a fully successful batch advances the
//! persisted last-sync timestamp; a connection failure abandons the batch
//! and leaves rediscovery to offline reconciliation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use nimbus_core::{
    epoch_seconds, ConfigStore, ListFolderResult, Metadata, RemoteClient, RemoteError, Rev,
    WriteMode,
};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::batch::coalesce;
use crate::error::Result;
use crate::events::{FileEvent, FileEventKind};
use crate::flag::StateFlag;
use crate::queue::TimedQueue;
use crate::signals::{Signal, SignalHub};
use crate::status::{StatusCell, SyncStatus};

/// Quiescence window before a batch closes. Tunable.
pub const BATCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Size-stability poll interval for freshly created files. Tunable
/// heuristic; long enough for most editors to finish their write.
pub const CREATED_SIZE_POLL: Duration = Duration::from_millis(500);

/// Size-stability poll interval for modified files. Tunable heuristic.
pub const MODIFIED_SIZE_POLL: Duration = Duration::from_millis(200);

/// Per-batch dispatch width.
pub fn dispatch_concurrency() -> usize {
    2 * std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Poll the file size until two consecutive reads match, so partially
/// written files are not shipped mid-write.
async fn wait_for_stable_size(path: &Path, interval: Duration) -> std::io::Result<()> {
    loop {
        let size_before = tokio::fs::metadata(path).await?.len();
        sleep(interval).await;
        let size_after = tokio::fs::metadata(path).await?.len();
        if size_before == size_after {
            return Ok(());
        }
    }
}

/// Basenames with more than one dot are almost always editor save
/// tempfiles being swapped into place; moves onto them are dropped.
fn is_save_tempfile(dest: &Path) -> bool {
    dest.file_name()
        .map(|name| name.to_string_lossy().matches('.').count() > 1)
        .unwrap_or(false)
}

/// Replays local file events as remote mutations.
///
/// Every handler translates the local path, checks client exclusion
/// policy first, and keeps the revision index in step with what the
/// remote reports back.
#[derive(Clone)]
pub struct RemoteReplay {
    client: Arc<dyn RemoteClient>,
}

impl RemoteReplay {
    pub fn new(client: Arc<dyn RemoteClient>) -> Self {
        Self { client }
    }

    pub async fn dispatch(&self, event: &FileEvent) -> std::result::Result<(), RemoteError> {
        debug!(kind = ?event.kind, path = %event.src_path.display(), "dispatching");
        match event.kind {
            FileEventKind::Created => self.on_created(event).await,
            FileEventKind::Deleted => self.on_deleted(event).await,
            FileEventKind::Modified => self.on_modified(event).await,
            FileEventKind::Moved => self.on_moved(event).await,
        }
    }

    async fn on_created(&self, event: &FileEvent) -> std::result::Result<(), RemoteError> {
        let remote_path = self.client.to_remote_path(&event.src_path);
        if self.client.is_excluded(&remote_path) {
            return Ok(());
        }

        if event.is_directory {
            if self.client.get_metadata(&remote_path).await?.is_none() {
                self.client.make_dir(&remote_path).await?;
            }
            self.client.set_local_rev(&remote_path, Some(Rev::Folder)).await;
            return Ok(());
        }

        let Ok(md) = tokio::fs::metadata(&event.src_path).await else {
            // Already gone again; nothing to upload.
            return Ok(());
        };
        if !md.is_file() {
            return Ok(());
        }

        wait_for_stable_size(&event.src_path, CREATED_SIZE_POLL).await?;

        // A tracked path seen as "created" is usually an editor swapping a
        // backup file into place; update the existing revision instead of
        // adding a duplicate.
        let mode = match self.client.get_local_rev(&remote_path).await {
            Some(Rev::File(rev)) => WriteMode::Update(rev),
            _ => WriteMode::Add,
        };
        let uploaded = self
            .client
            .upload(&event.src_path, &remote_path, true, mode)
            .await?;
        self.client
            .set_local_rev(&uploaded.path, Some(Rev::File(uploaded.rev.clone())))
            .await;
        Ok(())
    }

    async fn on_modified(&self, event: &FileEvent) -> std::result::Result<(), RemoteError> {
        if event.is_directory {
            return Ok(());
        }
        let remote_path = self.client.to_remote_path(&event.src_path);
        if self.client.is_excluded(&remote_path) {
            return Ok(());
        }
        let Ok(md) = tokio::fs::metadata(&event.src_path).await else {
            return Ok(());
        };
        if !md.is_file() {
            return Ok(());
        }

        wait_for_stable_size(&event.src_path, MODIFIED_SIZE_POLL).await?;

        let mode = match self.client.get_local_rev(&remote_path).await {
            Some(Rev::File(rev)) => WriteMode::Update(rev),
            _ => WriteMode::Add,
        };
        let uploaded = self
            .client
            .upload(&event.src_path, &remote_path, true, mode)
            .await?;
        debug!(path = %uploaded.path, rev = %uploaded.rev, "modified file uploaded");
        self.client
            .set_local_rev(&uploaded.path, Some(Rev::File(uploaded.rev.clone())))
            .await;
        Ok(())
    }

    async fn on_deleted(&self, event: &FileEvent) -> std::result::Result<(), RemoteError> {
        let remote_path = self.client.to_remote_path(&event.src_path);
        if self.client.is_excluded(&remote_path) {
            return Ok(());
        }
        if self.client.get_local_rev(&remote_path).await.is_none() {
            // Never uploaded; nothing to remove.
            return Ok(());
        }
        let removed = self.client.remove(&remote_path).await?;
        self.client.set_local_rev(removed.path(), None).await;
        if matches!(removed, Metadata::Folder(_)) {
            // The remote removed the whole subtree with it.
            self.clear_subtree_revs(removed.path()).await;
        }
        Ok(())
    }

    /// Drop every tracked revision strictly below `remote_path`.
    async fn clear_subtree_revs(&self, remote_path: &str) {
        let prefix = format!("{}/", remote_path.to_lowercase());
        for (tracked, _) in self.client.rev_index().await {
            if tracked.starts_with(&prefix) {
                self.client.set_local_rev(&tracked, None).await;
            }
        }
    }

    async fn on_moved(&self, event: &FileEvent) -> std::result::Result<(), RemoteError> {
        let Some(dest_path) = event.dest_path.as_deref() else {
            return Ok(());
        };
        let remote_src = self.client.to_remote_path(&event.src_path);
        let remote_dest = self.client.to_remote_path(dest_path);

        if self.client.is_excluded(&remote_dest) {
            return Ok(());
        }
        if is_save_tempfile(dest_path) {
            debug!(dest = %dest_path.display(), "dropping save-tempfile move");
            return Ok(());
        }

        let moved = self.client.move_entry(&remote_src, &remote_dest).await?;
        self.client.set_local_rev(&remote_src, None).await;

        match moved {
            Metadata::File(md) => {
                self.client
                    .set_local_rev(&md.path, Some(Rev::File(md.rev)))
                    .await;
            }
            Metadata::Folder(md) => {
                // The old subtree's entries are stale as a whole.
                self.clear_subtree_revs(&remote_src).await;
                self.client.set_local_rev(&md.path, Some(Rev::Folder)).await;
                // The remote moved the whole subtree; re-record every
                // descendant's revision under its new path.
                let pages = self.client.list_folder(&md.path, true).await?;
                for entry in ListFolderResult::flatten(pages) {
                    match entry {
                        Metadata::File(child) => {
                            self.client
                                .set_local_rev(&child.path, Some(Rev::File(child.rev)))
                                .await;
                        }
                        Metadata::Folder(child) => {
                            self.client.set_local_rev(&child.path, Some(Rev::Folder)).await;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

enum BatchOutcome {
    Complete,
    ConnectionLost,
}

/// Drains the local queue in debounced batches and replays them remotely.
pub struct UploadWorker {
    queue: Arc<TimedQueue>,
    replay: RemoteReplay,
    running: StateFlag,
    sync_lock: Arc<Mutex<()>>,
    signals: SignalHub,
    config: Arc<ConfigStore>,
    status: StatusCell,
    debounce: Duration,
    concurrency: usize,
}

impl UploadWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<TimedQueue>,
        client: Arc<dyn RemoteClient>,
        running: StateFlag,
        sync_lock: Arc<Mutex<()>>,
        signals: SignalHub,
        config: Arc<ConfigStore>,
        status: StatusCell,
    ) -> Self {
        Self {
            queue,
            replay: RemoteReplay::new(client),
            running,
            sync_lock,
            signals,
            config,
            status,
            debounce: BATCH_DEBOUNCE,
            concurrency: dispatch_concurrency(),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Worker loop. Returns only on a non-connection error, which the
    /// orchestrator logs.
    pub async fn run(self) -> Result<()> {
        loop {
            let first = self.queue.get().await;
            let mut events = vec![first];

            // Close the batch only after the watcher has been idle for the
            // whole debounce window.
            while self.queue.elapsed_since_last_put() < self.debounce {
                sleep(self.debounce).await;
            }
            while let Some(event) = self.queue.try_get() {
                events.push(event);
            }

            let events = coalesce(events);
            info!(count = events.len(), "dispatching upload batch");
            self.status.set(SyncStatus::Syncing);

            let outcome = {
                let _guard = self.sync_lock.lock().await;
                self.dispatch_batch(events).await?
            };

            match outcome {
                BatchOutcome::Complete => {
                    self.config.set_last_sync(epoch_seconds())?;
                    self.status.set(SyncStatus::UpToDate);
                }
                BatchOutcome::ConnectionLost => {
                    warn!("connection lost during upload batch");
                    self.status.set(SyncStatus::Connecting);
                    self.signals.emit(Signal::Disconnected);
                    self.running.clear();
                }
            }
        }
    }

    async fn dispatch_batch(&self, events: Vec<FileEvent>) -> Result<BatchOutcome> {
        let failures: Vec<RemoteError> = stream::iter(events)
            .map(|event| {
                let replay = self.replay.clone();
                async move { replay.dispatch(&event).await }
            })
            .buffer_unordered(self.concurrency.max(1))
            .filter_map(|result| async move { result.err() })
            .collect()
            .await;

        // Any connection loss pauses syncing, no matter what else failed
        // alongside it; the abandoned batch is rediscovered by offline
        // reconciliation. Other failures in the same batch are surfaced
        // in the log rather than dropped.
        if failures.iter().any(|err| err.is_connection()) {
            for err in failures.iter().filter(|err| !err.is_connection()) {
                warn!(error = %err, "failure in batch abandoned by connection loss");
            }
            return Ok(BatchOutcome::ConnectionLost);
        }

        let mut failures = failures.into_iter();
        if let Some(err) = failures.next() {
            for extra in failures {
                warn!(error = %extra, "additional failure in failed batch");
            }
            return Err(err.into());
        }
        Ok(BatchOutcome::Complete)
    }
}
