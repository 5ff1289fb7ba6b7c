//! Download worker: remote changes in to the local tree.
//!
//! The worker long-polls the remote and applies reported changes under
//! the sync lock. While applying, the watcher's `active` gate is cleared
//! so the disk writes made here do not echo back into the upload
//! pipeline; a short settle delay inside the lock lets the watcher flush
//! its residual events while they are still being discarded.

use std::sync::Arc;
use std::time::Duration;

use nimbus_core::RemoteClient;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::Result;
use crate::flag::StateFlag;
use crate::signals::{Signal, SignalHub};
use crate::status::{StatusCell, SyncStatus};

/// Upper bound on one long-poll, so the worker revisits `running`
/// regularly.
pub const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// Time the watcher stays gated after an apply, letting residual events
/// drain while still discarded.
pub const APPLY_SETTLE_DELAY: Duration = Duration::from_secs(2);

pub struct DownloadWorker {
    client: Arc<dyn RemoteClient>,
    running: StateFlag,
    watcher_active: StateFlag,
    sync_lock: Arc<Mutex<()>>,
    signals: SignalHub,
    status: StatusCell,
    poll_timeout: Duration,
    settle_delay: Duration,
}

impl DownloadWorker {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        running: StateFlag,
        watcher_active: StateFlag,
        sync_lock: Arc<Mutex<()>>,
        signals: SignalHub,
        status: StatusCell,
    ) -> Self {
        Self {
            client,
            running,
            watcher_active,
            sync_lock,
            signals,
            status,
            poll_timeout: LONG_POLL_TIMEOUT,
            settle_delay: APPLY_SETTLE_DELAY,
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Worker loop. Returns only on a non-connection error, which the
    /// orchestrator logs.
    pub async fn run(self) -> Result<()> {
        loop {
            self.running.wait().await;

            match self.poll_once().await {
                Ok(()) => {}
                Err(err) if err.is_connection() => {
                    warn!(error = %err, "connection lost during download poll");
                    self.status.set(SyncStatus::Connecting);
                    self.signals.emit(Signal::Disconnected);
                    self.running.clear();
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn poll_once(&self) -> Result<()> {
        let has_changes = self.client.wait_for_remote_changes(self.poll_timeout).await?;

        // Running may have been cleared during the long-poll.
        self.running.wait().await;

        if has_changes {
            info!("applying remote changes");
            self.status.set(SyncStatus::Syncing);
            self.watcher_active.clear();
            let applied = {
                let _guard = self.sync_lock.lock().await;
                let result = self.fetch_and_apply().await;
                // A failed apply may still have written partially; let the
                // watcher flush those events while they are discarded.
                sleep(self.settle_delay).await;
                result
            };
            // The gate must reopen however the apply went, or every local
            // event would be dropped from here on.
            self.watcher_active.set();
            applied?;
            self.status.set(SyncStatus::UpToDate);
        }
        Ok(())
    }

    async fn fetch_and_apply(&self) -> Result<()> {
        let changes = self.client.list_remote_changes().await?;
        self.client.apply_remote_changes(changes).await?;
        Ok(())
    }
}
