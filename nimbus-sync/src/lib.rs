//! Bidirectional synchronization core.
//!
//! Five long-lived tasks cooperate around a few shared primitives: a
//! recursive [`watcher::FileEventSource`] feeds raw events into the
//! [`queue::TimedQueue`]; the [`upload::UploadWorker`] drains it in
//! debounced, coalesced batches and replays them against the remote; the
//! [`download::DownloadWorker`] long-polls the remote and applies its
//! changes locally; the [`connection::ConnectionSupervisor`] probes the
//! account and drives the `running` gate both workers wait on; and the
//! [`monitor::SyncMonitor`] owns the pause/resume/connection state machine
//! and the offline-reconciliation walk that bridges downtime.
//!
//! Upload and download never mutate disk or remote concurrently: both
//! sides take the single sync lock for the duration of a batch dispatch or
//! a remote-change application.

pub mod batch;
pub mod connection;
pub mod download;
pub mod error;
pub mod events;
pub mod flag;
pub mod monitor;
pub mod queue;
pub mod reconcile;
pub mod signals;
pub mod snapshot;
pub mod status;
pub mod upload;
pub mod watcher;

pub use error::{Result, SyncError};
pub use events::{FileEvent, FileEventKind};
pub use flag::StateFlag;
pub use monitor::{MonitorConfig, SyncMonitor, SyncState};
pub use signals::{Signal, SignalHub};
pub use status::{StatusCell, SyncStatus};
