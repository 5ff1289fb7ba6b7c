//! Local filesystem event model.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEventKind {
    Created,
    Deleted,
    Modified,
    Moved,
}

/// A single observed mutation of the local tree.
///
/// `dest_path` is only present for [`FileEventKind::Moved`] events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub src_path: PathBuf,
    pub dest_path: Option<PathBuf>,
    pub is_directory: bool,
}

impl FileEvent {
    pub fn created(src_path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            kind: FileEventKind::Created,
            src_path: src_path.into(),
            dest_path: None,
            is_directory,
        }
    }

    pub fn deleted(src_path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            kind: FileEventKind::Deleted,
            src_path: src_path.into(),
            dest_path: None,
            is_directory,
        }
    }

    pub fn modified(src_path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            kind: FileEventKind::Modified,
            src_path: src_path.into(),
            dest_path: None,
            is_directory,
        }
    }

    pub fn moved(
        src_path: impl Into<PathBuf>,
        dest_path: impl Into<PathBuf>,
        is_directory: bool,
    ) -> Self {
        Self {
            kind: FileEventKind::Moved,
            src_path: src_path.into(),
            dest_path: Some(dest_path.into()),
            is_directory,
        }
    }
}
