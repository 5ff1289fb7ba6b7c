//! Connection-health supervisor.
//!
//! Runs for the entire process, independent of whether syncing is
//! running. Probes the remote with the inexpensive space-usage call; on
//! success it raises `connected` (emitting the signal on the edge) and
//! fans out the usage snapshot, on a connection failure it clears both
//! gates and emits `disconnected`, then retries on a short delay.

use std::sync::Arc;
use std::time::Duration;

use nimbus_core::RemoteClient;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::Result;
use crate::flag::StateFlag;
use crate::signals::{Signal, SignalHub};
use crate::status::{StatusCell, SyncStatus};

pub const PROBE_INTERVAL: Duration = Duration::from_secs(5);
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct ConnectionSupervisor {
    client: Arc<dyn RemoteClient>,
    connected: StateFlag,
    running: StateFlag,
    signals: SignalHub,
    status: StatusCell,
    probe_interval: Duration,
    retry_delay: Duration,
}

impl ConnectionSupervisor {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        connected: StateFlag,
        running: StateFlag,
        signals: SignalHub,
        status: StatusCell,
    ) -> Self {
        Self {
            client,
            connected,
            running,
            signals,
            status,
            probe_interval: PROBE_INTERVAL,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Supervisor loop. Returns only on a non-connection error.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.client.get_space_usage().await {
                Ok(usage) => {
                    if !self.connected.is_set() {
                        self.connected.set();
                        self.signals.emit(Signal::Connected);
                    }
                    self.signals.emit(Signal::AccountUsage(usage));
                    sleep(self.probe_interval).await;
                }
                Err(err) if err.is_connection() => {
                    debug!(error = %err, "connection probe failed");
                    self.running.clear();
                    self.connected.clear();
                    self.signals.emit(Signal::Disconnected);
                    info!("connecting...");
                    self.status.set(SyncStatus::Connecting);
                    sleep(self.retry_delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
