//! Point-in-time snapshot of the local tree.
//!
//! Offline reconciliation compares one of these against the revision
//! index to discover what changed while the daemon was not running. The
//! snapshot records per-path stat info (ctime, mtime, is_dir), skips
//! hardlinked duplicates by inode, and supports case-normalized
//! membership tests to mirror the remote's case-insensitive paths.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatInfo {
    /// Inode-change time, seconds since epoch. Falls back to mtime on
    /// platforms without a ctime.
    pub ctime: f64,
    /// Content-modification time, seconds since epoch.
    pub mtime: f64,
    pub is_dir: bool,
    pub inode: u64,
}

impl StatInfo {
    /// The later of ctime and mtime; what reconciliation compares against
    /// the last-sync timestamp.
    pub fn changed_at(&self) -> f64 {
        self.ctime.max(self.mtime)
    }
}

fn system_time_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(unix)]
fn stat_fields(md: &std::fs::Metadata, _mtime: f64) -> (u64, u64, f64) {
    use std::os::unix::fs::MetadataExt;
    let ctime = md.ctime() as f64 + md.ctime_nsec() as f64 / 1e9;
    (md.dev(), md.ino(), ctime)
}

#[cfg(not(unix))]
fn stat_fields(_md: &std::fs::Metadata, mtime: f64) -> (u64, u64, f64) {
    (0, 0, mtime)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Recursive stat snapshot of a directory tree, excluding the root entry
/// itself.
#[derive(Debug, Clone)]
pub struct DirectorySnapshot {
    entries: BTreeMap<PathBuf, StatInfo>,
    normalized: HashSet<String>,
}

impl DirectorySnapshot {
    pub fn capture(root: &Path) -> io::Result<Self> {
        let mut entries = BTreeMap::new();
        let mut normalized = HashSet::new();
        let mut seen_inodes: HashSet<(u64, u64)> = HashSet::new();

        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            let entry = entry.map_err(io::Error::from)?;
            let md = entry.metadata().map_err(io::Error::from)?;
            let mtime = md.modified().map(system_time_secs).unwrap_or(0.0);
            let (dev, inode, ctime) = stat_fields(&md, mtime);

            // Hardlinked files appear once, under the first path walked.
            if !md.is_dir() && inode != 0 && !seen_inodes.insert((dev, inode)) {
                continue;
            }

            let path = entry.into_path();
            normalized.insert(normalize_path(&path));
            entries.insert(
                path,
                StatInfo {
                    ctime,
                    mtime,
                    is_dir: md.is_dir(),
                    inode,
                },
            );
        }

        Ok(Self {
            entries,
            normalized,
        })
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    pub fn stat_info(&self, path: &Path) -> Option<&StatInfo> {
        self.entries.get(path)
    }

    pub fn inode(&self, path: &Path) -> Option<u64> {
        self.entries.get(path).map(|info| info.inode)
    }

    /// Case-insensitive membership test.
    pub fn contains_case_normalized(&self, path: &Path) -> bool {
        self.normalized.contains(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
