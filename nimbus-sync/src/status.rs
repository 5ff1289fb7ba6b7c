//! User-visible sync status.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    UpToDate,
    Syncing,
    Connecting,
    Indexing,
    Paused,
    Stopped,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SyncStatus::UpToDate => "Up to date",
            SyncStatus::Syncing => "Syncing...",
            SyncStatus::Connecting => "Connecting...",
            SyncStatus::Indexing => "Indexing...",
            SyncStatus::Paused => "Paused",
            SyncStatus::Stopped => "Stopped",
        };
        f.write_str(text)
    }
}

/// Shared cell holding the current status, observable via `watch`.
#[derive(Debug, Clone)]
pub struct StatusCell {
    tx: Arc<watch::Sender<SyncStatus>>,
}

impl StatusCell {
    pub fn new(initial: SyncStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, status: SyncStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            tracing::info!(%status, "status");
        }
    }

    pub fn current(&self) -> SyncStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(SyncStatus::Stopped)
    }
}
