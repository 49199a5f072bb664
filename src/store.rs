//! Release Store - JSON-backed record of notifications already sent
//!
//! The store maps each [`NotificationKey`] to the date its notification was
//! first created. It is the only source of truth for dedup decisions.
//!
//! On disk it is a single pretty-printed JSON object:
//!
//! ```json
//! {
//!   "tt0944947:S08E06": "2024-05-01",
//!   "tt1160419": "2024-05-03"
//! }
//! ```
//!
//! Loading never fails: a missing file is an empty store, and an unreadable
//! or malformed file is logged and replaced by an empty store. Saving goes
//! through a temporary file in the same directory followed by a rename.

use crate::error::{Error, Result};
use crate::models::NotificationKey;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Records older than this many days are pruned
pub const RETENTION_DAYS: i64 = 90;

/// Default file name inside the data directory
pub const STATE_FILE_NAME: &str = "created_events.json";

/// Persistent notification records
#[derive(Debug)]
pub struct ReleaseStore {
    path: PathBuf,
    records: BTreeMap<NotificationKey, NaiveDate>,
}

impl ReleaseStore {
    /// Create an empty store bound to `path`; call [`load`](Self::load) to read it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
        }
    }

    /// Create a store and immediately load it from disk
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        store.load();
        store
    }

    /// Get the default state file path (XDG data directory)
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("releasesentry")
            .join(STATE_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in key order
    pub fn records(&self) -> impl Iterator<Item = (&NotificationKey, &NaiveDate)> {
        self.records.iter()
    }

    pub fn is_notified(&self, key: &NotificationKey) -> bool {
        self.records.contains_key(key)
    }

    /// Date a key was recorded, if any
    pub fn notified_on(&self, key: &NotificationKey) -> Option<NaiveDate> {
        self.records.get(key).copied()
    }

    /// Record that `key` was notified on `as_of`; re-marking overwrites the date
    pub fn mark_notified(&mut self, key: NotificationKey, as_of: NaiveDate) {
        debug!("Marking {} as notified on {}", key, as_of);
        self.records.insert(key, as_of);
    }

    /// Remove every record dated strictly before `cutoff`
    pub fn prune_older_than(&mut self, cutoff: NaiveDate) -> usize {
        let before = self.records.len();
        self.records.retain(|_, date| *date >= cutoff);
        let removed = before - self.records.len();

        if removed > 0 {
            info!("Pruned {} records older than {}", removed, cutoff);
        }
        removed
    }

    /// Drop all records in memory; follow with [`save`](Self::save) to persist
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Replace the in-memory records with the file contents
    pub fn load(&mut self) {
        self.records = match std::fs::read_to_string(&self.path) {
            Ok(content) => match parse_records(&content) {
                Ok(records) => {
                    info!(
                        "Loaded {} notification records from {}",
                        records.len(),
                        self.path.display()
                    );
                    records
                }
                Err(e) => {
                    warn!(
                        "State file {} is unusable ({}), starting fresh",
                        self.path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state file at {}, starting fresh", self.path.display());
                BTreeMap::new()
            }
            Err(e) => {
                warn!(
                    "Could not read state file {} ({}), starting fresh",
                    self.path.display(),
                    e
                );
                BTreeMap::new()
            }
        };
    }

    /// Atomically write the records to disk
    ///
    /// On failure the previous file is left as it was and the in-memory
    /// records are kept.
    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| Error::persistence(&dir, e))?;

        let json = serde_json::to_string_pretty(&self.records).map_err(|e| {
            Error::persistence(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;

        // The temp file is removed on drop if anything below fails
        let mut tmp = tempfile::Builder::new()
            .prefix(".releasesentry-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| Error::persistence(&dir, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Error::persistence(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::persistence(&self.path, e.error))?;

        debug!(
            "Saved {} notification records to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Parse and validate the state file contents
fn parse_records(content: &str) -> Result<BTreeMap<NotificationKey, NaiveDate>> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|e| Error::parse("state file", e))?;

    let serde_json::Value::Object(map) = value else {
        return Err(Error::parse("state file", "expected a JSON object"));
    };

    let mut records = BTreeMap::new();
    for (key, value) in map {
        let date = value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());

        match date {
            Some(date) => {
                records.insert(NotificationKey::from(key), date);
            }
            None => warn!("Dropping state record {} with invalid date {}", key, value),
        }
    }

    Ok(records)
}
