//! Broadcast signal hub.
//!
//! The supervisor and the workers publish connection events here; the
//! monitor (and any UI layer) subscribes. Emitting with no subscribers is
//! a no-op, matching fire-and-forget signal semantics.

use nimbus_core::SpaceUsage;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Connected,
    Disconnected,
    AccountUsage(SpaceUsage),
}

#[derive(Debug, Clone)]
pub struct SignalHub {
    tx: broadcast::Sender<Signal>,
}

impl SignalHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }

    pub fn emit(&self, signal: Signal) {
        let _ = self.tx.send(signal);
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}
