//! Local filesystem event source.
//!
//! Wraps a recursive `notify` watcher rooted at the local sync directory
//! and translates platform-native events into [`FileEvent`]s. The source
//! is gated by an `active` flag: while cleared, observed events are logged
//! and discarded instead of enqueued, which is how the download worker
//! keeps its own disk writes from echoing back into the upload pipeline.
//!
//! No deduplication happens here; the upload worker coalesces batches.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, Event, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::FileEvent;
use crate::flag::StateFlag;
use crate::queue::TimedQueue;

fn dir_hint(kind_says_folder: bool, path: &Path) -> bool {
    kind_says_folder || path.is_dir()
}

/// Translate a native watcher event into zero or more [`FileEvent`]s.
///
/// Access and metadata-only events carry nothing to upload and are
/// dropped. A rename reported in halves (`From`/`To`) degrades to a
/// delete plus a create, which the remote replay handles like any other
/// pair.
fn translate(event: Event) -> Vec<FileEvent> {
    match event.kind {
        EventKind::Create(kind) => event
            .paths
            .into_iter()
            .map(|p| {
                let is_dir = dir_hint(kind == CreateKind::Folder, &p);
                FileEvent::created(p, is_dir)
            })
            .collect(),
        EventKind::Remove(kind) => event
            .paths
            .into_iter()
            .map(|p| FileEvent::deleted(p, kind == RemoveKind::Folder))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => {
                    let is_dir = to.is_dir();
                    vec![FileEvent::moved(from, to, is_dir)]
                }
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .into_iter()
            .map(|p| FileEvent::deleted(p, false))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .into_iter()
            .map(|p| {
                let is_dir = p.is_dir();
                FileEvent::created(p, is_dir)
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => event
            .paths
            .into_iter()
            .map(|p| {
                let is_dir = p.is_dir();
                FileEvent::modified(p, is_dir)
            })
            .collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Recursive watcher feeding the local event queue.
pub struct FileEventSource {
    watcher: Option<RecommendedWatcher>,
    active: StateFlag,
    root: PathBuf,
}

impl FileEventSource {
    /// Start watching `root` recursively. The source starts inactive;
    /// the orchestrator sets `active` once reconciliation has run.
    pub fn start(root: &Path, queue: Arc<TimedQueue>) -> Result<Self> {
        let active = StateFlag::new(false);
        let handler_active = active.clone();

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for file_event in translate(event) {
                        if handler_active.is_set() {
                            debug!(
                                kind = ?file_event.kind,
                                path = %file_event.src_path.display(),
                                "local event"
                            );
                            queue.put(file_event);
                        } else {
                            debug!(
                                kind = ?file_event.kind,
                                path = %file_event.src_path.display(),
                                "local event discarded while inactive"
                            );
                        }
                    }
                }
                Err(err) => warn!(error = %err, "watch error"),
            })?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        Ok(Self {
            watcher: Some(watcher),
            active,
            root: root.to_path_buf(),
        })
    }

    /// Gate controlling whether observed events are enqueued.
    pub fn active(&self) -> &StateFlag {
        &self.active
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching. Dropping the backend watcher joins its thread.
    pub fn stop(&mut self) {
        self.active.clear();
        if let Some(mut watcher) = self.watcher.take() {
            let _ = watcher.unwatch(&self.root);
        }
    }
}

impl Drop for FileEventSource {
    fn drop(&mut self) {
        self.stop();
    }
}
