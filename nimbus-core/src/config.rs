//! Persistent key-value configuration store.
//!
//! Sections and keys are stored as a TOML document on disk. The sync core
//! reads and writes a single entry, `("internal", "lastsync")`: the epoch
//! timestamp of the last fully completed upload batch. That timestamp only
//! ever moves forward; offline reconciliation compares file ctimes and
//! mtimes against it to find changes made while the daemon was down.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use thiserror::Error;
use tracing::debug;

pub const INTERNAL_SECTION: &str = "internal";
pub const LAST_SYNC_KEY: &str = "lastsync";

/// Current wall-clock time as fractional seconds since the epoch.
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

type Sections = BTreeMap<String, BTreeMap<String, toml::Value>>;

/// TOML-backed `(section, key)` store, persisted on every write.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    sections: RwLock<Sections>,
}

impl ConfigStore {
    /// Open the store at `path`, loading existing contents if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let sections = if path.exists() {
            toml::from_str(&fs::read_to_string(&path)?)?
        } else {
            Sections::new()
        };
        Ok(Self {
            path,
            sections: RwLock::new(sections),
        })
    }

    pub fn get_f64(&self, section: &str, key: &str) -> Option<f64> {
        let sections = self.read_sections();
        sections
            .get(section)
            .and_then(|entries| entries.get(key))
            .and_then(|value| match value {
                toml::Value::Float(f) => Some(*f),
                toml::Value::Integer(i) => Some(*i as f64),
                _ => None,
            })
    }

    pub fn set_f64(&self, section: &str, key: &str, value: f64) -> Result<(), ConfigError> {
        let snapshot = {
            let mut sections = self.write_sections();
            sections
                .entry(section.to_string())
                .or_default()
                .insert(key.to_string(), toml::Value::Float(value));
            sections.clone()
        };
        self.persist(&snapshot)
    }

    /// Timestamp of the last completed upload batch; 0.0 if never synced.
    pub fn last_sync(&self) -> f64 {
        self.get_f64(INTERNAL_SECTION, LAST_SYNC_KEY).unwrap_or(0.0)
    }

    /// Advance the last-sync timestamp. Values behind the stored one are
    /// ignored, so the timestamp never rewinds.
    pub fn set_last_sync(&self, timestamp: f64) -> Result<(), ConfigError> {
        if timestamp <= self.last_sync() {
            debug!(timestamp, "ignoring non-advancing lastsync update");
            return Ok(());
        }
        self.set_f64(INTERNAL_SECTION, LAST_SYNC_KEY, timestamp)
    }

    fn persist(&self, sections: &Sections) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string_pretty(sections)?)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_sections(&self) -> std::sync::RwLockReadGuard<'_, Sections> {
        self.sections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_sections(&self) -> std::sync::RwLockWriteGuard<'_, Sections> {
        self.sections.write().unwrap_or_else(|e| e.into_inner())
    }
}
