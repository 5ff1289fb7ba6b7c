//! Shared test support: an in-memory remote client with scriptable
//! failures, plus polling helpers.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nimbus_core::{
    ChangeSet, FileMetadata, FolderMetadata, ListFolderResult, Metadata, RemoteClient, RemoteError,
    Result, Rev, RevisionIndex, SpaceUsage, WriteMode,
};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Upload { path: String, mode: WriteMode },
    MakeDir { path: String },
    Move { src: String, dst: String },
    Remove { path: String },
    ListFolder { path: String },
    ListChanges,
    ApplyChanges,
}

#[derive(Debug, Clone)]
enum EntryKind {
    File { rev: String },
    Folder,
}

#[derive(Debug, Clone)]
struct EntryData {
    display: String,
    kind: EntryKind,
}

fn norm(path: &str) -> String {
    path.to_lowercase()
}

/// In-memory stand-in for the cloud account. Paths are Dropbox-style:
/// rooted at "/", case-insensitive.
pub struct MockRemote {
    root: PathBuf,
    offline: AtomicBool,
    rev_counter: AtomicU64,
    excluded: Vec<String>,
    entries: Mutex<HashMap<String, EntryData>>,
    index: Mutex<RevisionIndex>,
    calls: Mutex<Vec<RemoteCall>>,
    failing_uploads: Mutex<Vec<String>>,
    rejected_uploads: Mutex<Vec<String>>,
    fail_apply: AtomicBool,
    scripted_polls: Mutex<VecDeque<bool>>,
    pending_changes: Mutex<ChangeSet>,
}

impl MockRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            offline: AtomicBool::new(false),
            rev_counter: AtomicU64::new(0),
            excluded: Vec::new(),
            entries: Mutex::new(HashMap::new()),
            index: Mutex::new(RevisionIndex::new()),
            calls: Mutex::new(Vec::new()),
            failing_uploads: Mutex::new(Vec::new()),
            rejected_uploads: Mutex::new(Vec::new()),
            fail_apply: AtomicBool::new(false),
            scripted_polls: Mutex::new(VecDeque::new()),
            pending_changes: Mutex::new(ChangeSet::default()),
        }
    }

    pub fn with_excluded(mut self, prefix: &str) -> Self {
        self.excluded.push(norm(prefix));
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make uploads to this remote path fail with a timeout.
    pub async fn fail_uploads_to(&self, path: &str) {
        self.failing_uploads.lock().await.push(norm(path));
    }

    pub async fn clear_upload_failures(&self) {
        self.failing_uploads.lock().await.clear();
    }

    /// Make uploads to this remote path fail with a non-connection
    /// (API-class) error.
    pub async fn reject_uploads_to(&self, path: &str) {
        self.rejected_uploads.lock().await.push(norm(path));
    }

    /// Make `apply_remote_changes` fail with a non-connection error.
    pub fn fail_apply_with_api_error(&self) {
        self.fail_apply.store(true, Ordering::SeqCst);
    }

    /// Script the next long-poll result.
    pub async fn script_poll(&self, has_changes: bool) {
        self.scripted_polls.lock().await.push_back(has_changes);
    }

    /// Seed a remote file entry and track it in the revision index.
    pub async fn seed_file(&self, path: &str, rev: &str) {
        self.entries.lock().await.insert(
            norm(path),
            EntryData {
                display: path.to_string(),
                kind: EntryKind::File { rev: rev.to_string() },
            },
        );
        self.index
            .lock()
            .await
            .set(path, Some(Rev::File(rev.to_string())));
    }

    /// Seed a remote folder entry and track it in the revision index.
    pub async fn seed_folder(&self, path: &str) {
        self.entries.lock().await.insert(
            norm(path),
            EntryData {
                display: path.to_string(),
                kind: EntryKind::Folder,
            },
        );
        self.index.lock().await.set(path, Some(Rev::Folder));
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().await.clone()
    }

    pub async fn index_snapshot(&self) -> HashMap<String, Rev> {
        self.index.lock().await.snapshot()
    }

    fn next_rev(&self) -> String {
        let n = self.rev_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("rev-{n}")
    }

    fn fail_if_offline(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Connection("mock remote offline".into()))
        } else {
            Ok(())
        }
    }

    async fn record(&self, call: RemoteCall) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    fn local_root(&self) -> &Path {
        &self.root
    }

    fn to_remote_path(&self, local: &Path) -> String {
        let rel = local.strip_prefix(&self.root).unwrap_or(local);
        let mut remote = String::from("/");
        remote.push_str(&rel.to_string_lossy().replace('\\', "/"));
        remote
    }

    fn to_local_path(&self, remote: &str) -> PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }

    fn is_excluded(&self, remote_path: &str) -> bool {
        let path = norm(remote_path);
        self.excluded
            .iter()
            .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
    }

    async fn get_local_rev(&self, path: &str) -> Option<Rev> {
        self.index.lock().await.get(path)
    }

    async fn set_local_rev(&self, path: &str, rev: Option<Rev>) {
        self.index.lock().await.set(path, rev);
    }

    async fn rev_index(&self) -> HashMap<String, Rev> {
        self.index.lock().await.snapshot()
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<Metadata>> {
        self.fail_if_offline()?;
        let entries = self.entries.lock().await;
        Ok(entries.get(&norm(path)).map(|data| match &data.kind {
            EntryKind::File { rev } => Metadata::File(FileMetadata {
                path: data.display.clone(),
                rev: rev.clone(),
                size: 0,
            }),
            EntryKind::Folder => Metadata::Folder(FolderMetadata {
                path: data.display.clone(),
            }),
        }))
    }

    async fn list_folder(&self, path: &str, _recursive: bool) -> Result<Vec<ListFolderResult>> {
        self.fail_if_offline()?;
        self.record(RemoteCall::ListFolder { path: path.into() }).await;

        let prefix = format!("{}/", norm(path));
        let entries = self.entries.lock().await;
        let mut children: Vec<Metadata> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, data)| match &data.kind {
                EntryKind::File { rev } => Metadata::File(FileMetadata {
                    path: data.display.clone(),
                    rev: rev.clone(),
                    size: 0,
                }),
                EntryKind::Folder => Metadata::Folder(FolderMetadata {
                    path: data.display.clone(),
                }),
            })
            .collect();
        children.sort_by(|a, b| a.path().cmp(b.path()));

        // Two pages, to exercise flattening.
        let split = children.len() / 2;
        let tail = children.split_off(split);
        Ok(vec![
            ListFolderResult {
                entries: children,
                cursor: Some("cursor-1".into()),
                has_more: true,
            },
            ListFolderResult {
                entries: tail,
                cursor: None,
                has_more: false,
            },
        ])
    }

    async fn move_entry(&self, src: &str, dst: &str) -> Result<Metadata> {
        self.fail_if_offline()?;
        self.record(RemoteCall::Move {
            src: src.into(),
            dst: dst.into(),
        })
        .await;

        let mut entries = self.entries.lock().await;
        let src_key = norm(src);
        let dst_key = norm(dst);
        let Some(moved) = entries.remove(&src_key) else {
            return Err(RemoteError::Api(format!("not found: {src}")));
        };

        match moved.kind {
            EntryKind::File { .. } => {
                let rev = self.next_rev();
                entries.insert(
                    dst_key,
                    EntryData {
                        display: dst.to_string(),
                        kind: EntryKind::File { rev: rev.clone() },
                    },
                );
                Ok(Metadata::File(FileMetadata {
                    path: dst.to_string(),
                    rev,
                    size: 0,
                }))
            }
            EntryKind::Folder => {
                entries.insert(
                    dst_key.clone(),
                    EntryData {
                        display: dst.to_string(),
                        kind: EntryKind::Folder,
                    },
                );
                let child_prefix = format!("{src_key}/");
                let children: Vec<(String, EntryData)> = entries
                    .iter()
                    .filter(|(key, _)| key.starts_with(&child_prefix))
                    .map(|(key, data)| (key.clone(), data.clone()))
                    .collect();
                for (old_key, data) in children {
                    entries.remove(&old_key);
                    let suffix = old_key[src_key.len()..].to_string();
                    entries.insert(
                        format!("{dst_key}{suffix}"),
                        EntryData {
                            display: format!("{dst}{suffix}"),
                            kind: data.kind,
                        },
                    );
                }
                Ok(Metadata::Folder(FolderMetadata {
                    path: dst.to_string(),
                }))
            }
        }
    }

    async fn remove(&self, path: &str) -> Result<Metadata> {
        self.fail_if_offline()?;
        self.record(RemoteCall::Remove { path: path.into() }).await;

        let mut entries = self.entries.lock().await;
        let key = norm(path);
        let Some(removed) = entries.remove(&key) else {
            return Err(RemoteError::Api(format!("not found: {path}")));
        };
        let child_prefix = format!("{key}/");
        entries.retain(|entry_key, _| !entry_key.starts_with(&child_prefix));

        Ok(match removed.kind {
            EntryKind::File { rev } => Metadata::File(FileMetadata {
                path: removed.display,
                rev,
                size: 0,
            }),
            EntryKind::Folder => Metadata::Folder(FolderMetadata {
                path: removed.display,
            }),
        })
    }

    async fn upload(
        &self,
        local_path: &Path,
        remote_path: &str,
        _autorename: bool,
        mode: WriteMode,
    ) -> Result<FileMetadata> {
        self.fail_if_offline()?;
        if self.failing_uploads.lock().await.contains(&norm(remote_path)) {
            return Err(RemoteError::Timeout);
        }
        if self.rejected_uploads.lock().await.contains(&norm(remote_path)) {
            return Err(RemoteError::Api(format!("upload rejected: {remote_path}")));
        }
        self.record(RemoteCall::Upload {
            path: remote_path.into(),
            mode,
        })
        .await;

        let size = tokio::fs::metadata(local_path).await?.len();
        let rev = self.next_rev();
        self.entries.lock().await.insert(
            norm(remote_path),
            EntryData {
                display: remote_path.to_string(),
                kind: EntryKind::File { rev: rev.clone() },
            },
        );
        Ok(FileMetadata {
            path: remote_path.to_string(),
            rev,
            size,
        })
    }

    async fn make_dir(&self, path: &str) -> Result<FolderMetadata> {
        self.fail_if_offline()?;
        self.record(RemoteCall::MakeDir { path: path.into() }).await;
        self.entries.lock().await.insert(
            norm(path),
            EntryData {
                display: path.to_string(),
                kind: EntryKind::Folder,
            },
        );
        Ok(FolderMetadata {
            path: path.to_string(),
        })
    }

    async fn wait_for_remote_changes(&self, timeout: Duration) -> Result<bool> {
        self.fail_if_offline()?;
        if let Some(scripted) = self.scripted_polls.lock().await.pop_front() {
            return Ok(scripted);
        }
        tokio::time::sleep(timeout).await;
        Ok(false)
    }

    async fn list_remote_changes(&self) -> Result<ChangeSet> {
        self.fail_if_offline()?;
        self.record(RemoteCall::ListChanges).await;
        Ok(self.pending_changes.lock().await.clone())
    }

    async fn apply_remote_changes(&self, _changes: ChangeSet) -> Result<()> {
        self.fail_if_offline()?;
        self.record(RemoteCall::ApplyChanges).await;
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(RemoteError::Api("apply failed".into()));
        }
        Ok(())
    }

    async fn get_space_usage(&self) -> Result<SpaceUsage> {
        self.fail_if_offline()?;
        Ok(SpaceUsage {
            used: 42,
            allocated: 2_000_000_000,
        })
    }
}

/// Install a test subscriber once; repeated calls are no-ops.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `check` until it returns true or the deadline passes.
pub async fn wait_until<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}
