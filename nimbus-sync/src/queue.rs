//! Timed FIFO of local file events.
//!
//! Each enqueue stamps the queue with the wall-clock time of the put; the
//! upload worker reads that stamp to detect quiescence before closing a
//! batch. Puts are synchronous so the watcher callback thread can feed the
//! queue directly; gets await a wakeup.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;

use crate::events::FileEvent;

fn epoch_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Unbounded FIFO that remembers the time of the last put.
#[derive(Debug, Default)]
pub struct TimedQueue {
    inner: Mutex<VecDeque<FileEvent>>,
    notify: Notify,
    last_put_ms: AtomicU64,
}

impl TimedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event and stamp the enqueue time.
    pub fn put(&self, event: FileEvent) {
        {
            let mut queue = self.lock_inner();
            queue.push_back(event);
        }
        self.last_put_ms.store(epoch_millis(), Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Dequeue the next event, waiting until one is available.
    pub async fn get(&self) -> FileEvent {
        loop {
            if let Some(event) = self.lock_inner().pop_front() {
                return event;
            }
            self.notify.notified().await;
        }
    }

    /// Dequeue the next event if one is queued.
    pub fn try_get(&self) -> Option<FileEvent> {
        self.lock_inner().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock_inner().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_inner().is_empty()
    }

    /// Wall-clock of the most recent put, as seconds since the epoch.
    /// 0.0 if nothing was ever enqueued.
    pub fn last_enqueue_time(&self) -> f64 {
        self.last_put_ms.load(Ordering::SeqCst) as f64 / 1000.0
    }

    /// Time elapsed since the most recent put.
    pub fn elapsed_since_last_put(&self) -> Duration {
        let last = self.last_put_ms.load(Ordering::SeqCst);
        Duration::from_millis(epoch_millis().saturating_sub(last))
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, VecDeque<FileEvent>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
