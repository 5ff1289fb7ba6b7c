//! Sync orchestrator.
//!
//! Owns the pause/resume/connection state machine, spawns and stops the
//! watcher and the workers, and runs the offline-reconciliation walk on
//! every transition back to running. The connection supervisor and the
//! signal listener are spawned at construction and live for the entire
//! process.
//!
//! The two paused states are deliberately distinct: `PausedDisconnected`
//! auto-resumes when the supervisor reports the connection back, while
//! `PausedByUser` is sticky and only an explicit `resume` call leaves it.

use std::future::Future;
use std::sync::Arc;

use nimbus_core::{ConfigStore, RemoteClient};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::connection::{ConnectionSupervisor, PROBE_INTERVAL, RETRY_DELAY};
use crate::download::{DownloadWorker, APPLY_SETTLE_DELAY, LONG_POLL_TIMEOUT};
use crate::error::Result;
use crate::flag::StateFlag;
use crate::queue::TimedQueue;
use crate::reconcile;
use crate::signals::{Signal, SignalHub};
use crate::snapshot::DirectorySnapshot;
use crate::status::{StatusCell, SyncStatus};
use crate::upload::{UploadWorker, BATCH_DEBOUNCE};
use crate::watcher::FileEventSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Stopped,
    PausedByUser,
    PausedDisconnected,
    Running,
}

/// Timing knobs for the spawned tasks. Defaults match production
/// behavior; tests shrink them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub debounce: Duration,
    pub probe_interval: Duration,
    pub retry_delay: Duration,
    pub long_poll_timeout: Duration,
    pub settle_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce: BATCH_DEBOUNCE,
            probe_interval: PROBE_INTERVAL,
            retry_delay: RETRY_DELAY,
            long_poll_timeout: LONG_POLL_TIMEOUT,
            settle_delay: APPLY_SETTLE_DELAY,
        }
    }
}

struct MonitorState {
    phase: SyncState,
    source: Option<FileEventSource>,
    workers: Vec<JoinHandle<()>>,
}

struct Shared {
    client: Arc<dyn RemoteClient>,
    config_store: Arc<ConfigStore>,
    cfg: MonitorConfig,
    queue: Arc<TimedQueue>,
    running: StateFlag,
    connected: StateFlag,
    sync_lock: Arc<Mutex<()>>,
    signals: SignalHub,
    status: StatusCell,
    state: Mutex<MonitorState>,
}

impl Shared {
    /// Snapshot the local root, synthesize the changes made while
    /// inactive, queue them, and open the gates.
    async fn reconcile_and_activate(&self, state: &mut MonitorState) -> Result<()> {
        self.status.set(SyncStatus::Indexing);

        let root = self.client.local_root().to_path_buf();
        let snapshot =
            tokio::task::spawn_blocking(move || DirectorySnapshot::capture(&root)).await??;

        let last_sync = self.config_store.last_sync();
        let changes = reconcile::local_changes_since(&self.client, &snapshot, last_sync).await;
        info!(count = changes.len(), "queueing offline changes");
        for event in changes {
            self.queue.put(event);
        }

        self.running.set();
        if let Some(source) = state.source.as_ref() {
            source.active().set();
        }
        self.status.set(SyncStatus::UpToDate);
        Ok(())
    }

    fn deactivate(&self, state: &MonitorState) {
        self.running.clear();
        if let Some(source) = state.source.as_ref() {
            source.active().clear();
        }
    }

    async fn handle_connected(&self) {
        let mut state = self.state.lock().await;
        if state.phase != SyncState::PausedDisconnected {
            return;
        }
        info!("connection restored, resuming sync");
        match self.reconcile_and_activate(&mut state).await {
            Ok(()) => state.phase = SyncState::Running,
            Err(err) => error!(error = %err, "reconciliation after reconnect failed"),
        }
    }

    async fn handle_disconnected(&self) {
        let mut state = self.state.lock().await;
        if state.phase != SyncState::Running {
            return;
        }
        info!("connection lost, pausing sync");
        self.deactivate(&state);
        state.phase = SyncState::PausedDisconnected;
    }
}

async fn run_logged(name: &'static str, task: impl Future<Output = Result<()>>) {
    if let Err(err) = task.await {
        error!(worker = name, error = %err, "worker terminated");
    }
}

async fn listen(shared: Arc<Shared>) {
    let mut rx = shared.signals.subscribe();
    loop {
        match rx.recv().await {
            Ok(Signal::Connected) => shared.handle_connected().await,
            Ok(Signal::Disconnected) => shared.handle_disconnected().await,
            Ok(Signal::AccountUsage(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "signal listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Orchestrator tying the watcher, workers and supervisor together.
///
/// Must be constructed inside a tokio runtime.
pub struct SyncMonitor {
    shared: Arc<Shared>,
}

impl SyncMonitor {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        config_store: Arc<ConfigStore>,
        cfg: MonitorConfig,
    ) -> Self {
        let signals = SignalHub::new();
        let status = StatusCell::default();
        let connected = StateFlag::new(false);
        let running = StateFlag::new(false);

        let shared = Arc::new(Shared {
            client: client.clone(),
            config_store,
            cfg: cfg.clone(),
            queue: Arc::new(TimedQueue::new()),
            running: running.clone(),
            connected: connected.clone(),
            sync_lock: Arc::new(Mutex::new(())),
            signals: signals.clone(),
            status: status.clone(),
            state: Mutex::new(MonitorState {
                phase: SyncState::Stopped,
                source: None,
                workers: Vec::new(),
            }),
        });

        let supervisor = ConnectionSupervisor::new(client, connected, running, signals, status)
            .with_probe_interval(cfg.probe_interval)
            .with_retry_delay(cfg.retry_delay);
        tokio::spawn(run_logged("connection supervisor", supervisor.run()));
        tokio::spawn(listen(shared.clone()));

        Self { shared }
    }

    /// Stopped → Running: spawn the watcher and both workers, reconcile
    /// offline changes, open the gates. No-op in any other state.
    pub async fn start(&self) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        if state.phase != SyncState::Stopped {
            return Ok(());
        }

        let source = FileEventSource::start(shared.client.local_root(), shared.queue.clone())?;
        state.source = Some(source);

        let upload = UploadWorker::new(
            shared.queue.clone(),
            shared.client.clone(),
            shared.running.clone(),
            shared.sync_lock.clone(),
            shared.signals.clone(),
            shared.config_store.clone(),
            shared.status.clone(),
        )
        .with_debounce(shared.cfg.debounce);
        state
            .workers
            .push(tokio::spawn(run_logged("upload worker", upload.run())));

        // The download worker needs the watcher gate to suppress feedback
        // while it writes.
        let watcher_active = state
            .source
            .as_ref()
            .map(|source| source.active().clone())
            .unwrap_or_default();
        let download = DownloadWorker::new(
            shared.client.clone(),
            shared.running.clone(),
            watcher_active,
            shared.sync_lock.clone(),
            shared.signals.clone(),
            shared.status.clone(),
        )
        .with_poll_timeout(shared.cfg.long_poll_timeout)
        .with_settle_delay(shared.cfg.settle_delay);
        state
            .workers
            .push(tokio::spawn(run_logged("download worker", download.run())));

        shared.reconcile_and_activate(&mut state).await?;
        state.phase = SyncState::Running;
        Ok(())
    }

    /// User pause. Sticky: a reconnect never leaves this state.
    pub async fn pause(&self) {
        let mut state = self.shared.state.lock().await;
        if matches!(
            state.phase,
            SyncState::Running | SyncState::PausedDisconnected
        ) {
            info!("sync paused by user");
            self.shared.deactivate(&state);
            state.phase = SyncState::PausedByUser;
            self.shared.status.set(SyncStatus::Paused);
        }
    }

    /// User resume out of the sticky paused state.
    pub async fn resume(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if state.phase != SyncState::PausedByUser {
            return Ok(());
        }
        info!("sync resumed by user");
        self.shared.reconcile_and_activate(&mut state).await?;
        state.phase = SyncState::Running;
        Ok(())
    }

    /// Stop syncing and tear the watcher and workers down.
    pub async fn stop(&self) {
        let mut state = self.shared.state.lock().await;
        if state.phase == SyncState::Stopped {
            return;
        }
        info!("stopping sync");
        self.shared.deactivate(&state);
        if let Some(mut source) = state.source.take() {
            source.stop();
        }
        for handle in state.workers.drain(..) {
            handle.abort();
        }
        state.phase = SyncState::Stopped;
        self.shared.status.set(SyncStatus::Stopped);
    }

    pub async fn state(&self) -> SyncState {
        self.shared.state.lock().await.phase
    }

    pub fn status(&self) -> SyncStatus {
        self.shared.status.current()
    }

    pub fn signals(&self) -> SignalHub {
        self.shared.signals.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.is_set()
    }

    /// Number of local events waiting to be uploaded.
    pub fn pending_events(&self) -> usize {
        self.shared.queue.len()
    }
}
