//! Shared foundation for the nimbus sync daemon.
//!
//! This crate holds everything the synchronization core in `nimbus-sync`
//! consumes but does not own: the [`RemoteClient`] contract and its wire
//! types, the [`RevisionIndex`] ledger of what was last uploaded, the
//! error taxonomy with its connection-class predicate, and the persistent
//! key-value [`ConfigStore`].

pub mod config;
pub mod error;
pub mod remote;

pub use config::{epoch_seconds, ConfigError, ConfigStore};
pub use error::{RemoteError, Result};
pub use remote::{
    ChangeSet, FileMetadata, FolderMetadata, ListFolderResult, Metadata, RemoteChange,
    RemoteChangeKind, RemoteClient, Rev, RevisionIndex, SpaceUsage, WriteMode,
};
