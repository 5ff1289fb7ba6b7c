//! Remote client contract and wire types.
//!
//! The sync core never talks HTTP itself; it drives an implementation of
//! [`RemoteClient`] that exposes upload/move/remove/list/long-poll calls
//! against the cloud account plus the local [`RevisionIndex`] recording
//! what was last uploaded for every remote path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Revision token tracked for a remote path.
///
/// Files carry the opaque revision string returned by the remote; folders
/// are tracked with a dedicated sentinel since the remote does not version
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rev {
    File(String),
    Folder,
}

impl Rev {
    pub fn is_folder(&self) -> bool {
        matches!(self, Rev::Folder)
    }
}

/// Metadata for a file entry on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Display path on the remote.
    pub path: String,
    /// Revision token assigned by the remote.
    pub rev: String,
    pub size: u64,
}

/// Metadata for a folder entry on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderMetadata {
    /// Display path on the remote.
    pub path: String,
}

/// Metadata for any remote entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metadata {
    File(FileMetadata),
    Folder(FolderMetadata),
}

impl Metadata {
    pub fn path(&self) -> &str {
        match self {
            Metadata::File(md) => &md.path,
            Metadata::Folder(md) => &md.path,
        }
    }
}

/// Write disposition for an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// The path is new on the remote.
    Add,
    /// Overwrite the given revision; the remote auto-renames on mismatch
    /// when `autorename` is requested.
    Update(String),
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFolderResult {
    pub entries: Vec<Metadata>,
    pub cursor: Option<String>,
    pub has_more: bool,
}

impl ListFolderResult {
    /// Flatten a paged listing into a single entry sequence.
    pub fn flatten(pages: Vec<ListFolderResult>) -> Vec<Metadata> {
        pages.into_iter().flat_map(|page| page.entries).collect()
    }
}

/// A single mutation observed on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange {
    pub path: String,
    pub kind: RemoteChangeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChangeKind {
    File { rev: String },
    Folder,
    Removed,
}

/// The set of remote mutations reported by one delta listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub entries: Vec<RemoteChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Account storage usage snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceUsage {
    pub used: u64,
    pub allocated: u64,
}

/// Ledger mapping case-normalized remote paths to revision tokens.
///
/// Absence of a key means the path is not tracked. The sync workers are the
/// only writers, and only while holding the sync lock.
#[derive(Debug, Clone, Default)]
pub struct RevisionIndex {
    entries: HashMap<String, Rev>,
}

impl RevisionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(path: &str) -> String {
        path.to_lowercase()
    }

    pub fn get(&self, path: &str) -> Option<Rev> {
        self.entries.get(&Self::normalize(path)).cloned()
    }

    /// Record or clear the revision for a path. `None` removes the entry.
    pub fn set(&mut self, path: &str, rev: Option<Rev>) {
        let key = Self::normalize(path);
        match rev {
            Some(rev) => {
                self.entries.insert(key, rev);
            }
            None => {
                self.entries.remove(&key);
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&Self::normalize(path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all tracked entries, keyed by normalized remote path.
    pub fn snapshot(&self) -> HashMap<String, Rev> {
        self.entries.clone()
    }
}

/// Contract the sync core drives against the cloud account.
///
/// Implementations own the transport, authentication and the revision
/// index; the core owns scheduling, coalescing and mutual exclusion.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Local directory mirrored against the remote account.
    fn local_root(&self) -> &Path;

    /// Translate a local absolute path to its remote counterpart.
    fn to_remote_path(&self, local: &Path) -> String;

    /// Translate a remote path back to the local absolute path.
    fn to_local_path(&self, remote: &str) -> PathBuf;

    /// Whether client policy excludes this remote path from syncing.
    fn is_excluded(&self, remote_path: &str) -> bool;

    /// Revision last recorded for a remote path, if tracked.
    async fn get_local_rev(&self, path: &str) -> Option<Rev>;

    /// Record or clear (`None`) the revision for a remote path.
    async fn set_local_rev(&self, path: &str, rev: Option<Rev>);

    /// Snapshot of the whole revision index, keyed by normalized path.
    async fn rev_index(&self) -> HashMap<String, Rev>;

    /// Metadata for a remote path, or `None` if absent.
    async fn get_metadata(&self, path: &str) -> Result<Option<Metadata>>;

    /// Paged listing of a remote folder.
    async fn list_folder(&self, path: &str, recursive: bool) -> Result<Vec<ListFolderResult>>;

    /// Move or rename an entry; returns the metadata of the destination.
    async fn move_entry(&self, src: &str, dst: &str) -> Result<Metadata>;

    /// Delete an entry; returns the metadata it had.
    async fn remove(&self, path: &str) -> Result<Metadata>;

    /// Upload a local file, whole, in one call.
    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        autorename: bool,
        mode: WriteMode,
    ) -> Result<FileMetadata>;

    /// Create a remote folder.
    async fn make_dir(&self, path: &str) -> Result<FolderMetadata>;

    /// Block on the remote long-poll endpoint until changes are pending or
    /// the timeout elapses. Returns whether changes are pending.
    async fn wait_for_remote_changes(&self, timeout: Duration) -> Result<bool>;

    /// Fetch the pending remote mutations.
    async fn list_remote_changes(&self) -> Result<ChangeSet>;

    /// Apply remote mutations to the local tree, updating the revision
    /// index as entries land.
    async fn apply_remote_changes(&self, changes: ChangeSet) -> Result<()>;

    /// Inexpensive probe used for connection health and quota display.
    async fn get_space_usage(&self) -> Result<SpaceUsage>;
}
