//! Batch coalescing.
//!
//! A drained batch is rewritten before dispatch so that redundant or
//! dominated events never reach the remote: a moved or deleted folder
//! subsumes every event for its descendants observed in the same batch,
//! and a freshly created path swallows the modification events the write
//! itself produced. After coalescing the batch is an unordered set; the
//! dispatch order carries no meaning.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::events::{FileEvent, FileEventKind};

/// Whether `path` is a strict descendant of `parent`.
///
/// Comparison is component-wise, so `/root/AB` is not a child of
/// `/root/A`.
fn is_strict_child(path: &Path, parent: &Path) -> bool {
    path != parent && path.starts_with(parent)
}

/// Rewrite a batch, removing events dominated by others in the same batch.
///
/// Rules, applied in order:
/// 1. a `Moved` folder event removes every other `Moved` event under its
///    source path;
/// 2. a `Deleted` folder event removes every other `Deleted` event under
///    its source path;
/// 3. a `Created` event removes all `Modified` events for the same path.
pub fn coalesce(mut events: Vec<FileEvent>) -> Vec<FileEvent> {
    let moved_folders: Vec<PathBuf> = events
        .iter()
        .filter(|e| e.kind == FileEventKind::Moved && e.is_directory)
        .map(|e| e.src_path.clone())
        .collect();
    events.retain(|e| {
        e.kind != FileEventKind::Moved
            || !moved_folders.iter().any(|p| is_strict_child(&e.src_path, p))
    });

    let deleted_folders: Vec<PathBuf> = events
        .iter()
        .filter(|e| e.kind == FileEventKind::Deleted && e.is_directory)
        .map(|e| e.src_path.clone())
        .collect();
    events.retain(|e| {
        e.kind != FileEventKind::Deleted
            || !deleted_folders
                .iter()
                .any(|p| is_strict_child(&e.src_path, p))
    });

    let created: HashSet<PathBuf> = events
        .iter()
        .filter(|e| e.kind == FileEventKind::Created)
        .map(|e| e.src_path.clone())
        .collect();
    events.retain(|e| e.kind != FileEventKind::Modified || !created.contains(&e.src_path));

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn folder_move_subsumes_child_moves() {
        let events = vec![
            FileEvent::moved("/root/a", "/root/b", true),
            FileEvent::moved("/root/a/x.txt", "/root/b/x.txt", false),
            FileEvent::moved("/root/a/y.txt", "/root/b/y.txt", false),
        ];

        let coalesced = coalesce(events);
        assert_eq!(coalesced, vec![FileEvent::moved("/root/a", "/root/b", true)]);
    }

    #[test]
    fn folder_delete_subsumes_child_deletes() {
        let events = vec![
            FileEvent::deleted("/root/a", true),
            FileEvent::deleted("/root/a/x.txt", false),
            FileEvent::deleted("/root/a/sub", true),
            FileEvent::deleted("/root/a/sub/y.txt", false),
        ];

        let coalesced = coalesce(events);
        assert_eq!(coalesced, vec![FileEvent::deleted("/root/a", true)]);
    }

    #[test]
    fn create_swallows_modifications_of_the_same_path() {
        let events = vec![
            FileEvent::created("/root/doc.md", false),
            FileEvent::modified("/root/doc.md", false),
            FileEvent::modified("/root/doc.md", false),
        ];

        let coalesced = coalesce(events);
        assert_eq!(coalesced, vec![FileEvent::created("/root/doc.md", false)]);
    }

    #[test]
    fn sibling_prefix_names_are_not_children() {
        let events = vec![
            FileEvent::moved("/root/a", "/root/b", true),
            FileEvent::moved("/root/ab", "/root/bb", true),
        ];

        let coalesced = coalesce(events.clone());
        assert_eq!(coalesced, events);
    }

    #[test]
    fn unrelated_events_survive_intact() {
        let events = vec![
            FileEvent::created("/root/new.txt", false),
            FileEvent::deleted("/root/old.txt", false),
            FileEvent::modified("/root/other.txt", false),
            FileEvent::moved("/root/from.txt", "/root/to.txt", false),
        ];

        let coalesced = coalesce(events.clone());
        assert_eq!(coalesced, events);
    }

    #[test]
    fn file_moves_do_not_subsume_anything() {
        let events = vec![
            FileEvent::moved("/root/a", "/root/b", false),
            FileEvent::moved("/root/a/x.txt", "/root/b/x.txt", false),
        ];

        // Only directory moves dominate their descendants.
        let coalesced = coalesce(events.clone());
        assert_eq!(coalesced, events);
    }

    #[test]
    fn modified_directory_under_created_directory_is_fused() {
        let events = vec![
            FileEvent::created("/root/newdir", true),
            FileEvent::modified("/root/newdir", true),
        ];

        let coalesced = coalesce(events);
        assert_eq!(coalesced, vec![FileEvent::created("/root/newdir", true)]);
    }
}
