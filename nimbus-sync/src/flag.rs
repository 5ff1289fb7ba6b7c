//! Manual-reset event flags.

use std::sync::Arc;

use tokio::sync::watch;

/// A boolean gate with set/clear/wait semantics, shared by cloning.
///
/// `wait` resolves immediately while the flag is set and parks the caller
/// until the next `set` otherwise. Used for the `running` gate both
/// workers block on, the watcher `active` gate, and the supervisor's
/// `connected` state.
#[derive(Debug, Clone)]
pub struct StateFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl StateFlag {
    pub fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the flag is set.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so the channel cannot close
        // while we wait.
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for StateFlag {
    fn default() -> Self {
        Self::new(false)
    }
}
