// src/store.rs

//! Persisted incremental state: a key → record store addressed by task
//! identity ([`TaskName::storage_key`](crate::graph::TaskName)).
//!
//! The format is an implementation detail; the contract is get/put by key.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::Result;
use crate::task::Fingerprint;

/// Relative path (from the workspace root) to the state file.
///
/// The effective path on disk is `<root>/.taskdag/state.json`.
pub const STATE_FILE_PATH: &str = ".taskdag/state.json";

/// Per-task persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Fingerprint at the time of the last successful run.
    pub fingerprint: Option<Fingerprint>,
    /// Milliseconds since the Unix epoch of the last successful run start.
    pub last_success_ms: u64,
    /// Milliseconds since the Unix epoch of the last run end, success or
    /// not.
    pub last_run_ms: u64,
}

impl TaskRecord {
    pub fn last_success(&self) -> Option<SystemTime> {
        if self.last_success_ms == 0 {
            None
        } else {
            Some(UNIX_EPOCH + Duration::from_millis(self.last_success_ms))
        }
    }
}

/// Milliseconds since the Unix epoch, for record timestamps.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Abstract storage for task records.
pub trait StateStore: Send {
    fn load(&self, key: &str) -> Result<Option<TaskRecord>>;
    fn save(&mut self, key: &str, record: TaskRecord) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    /// Drop records whose key is not in `active_keys`.
    fn prune(&mut self, active_keys: &[&str]) -> Result<()>;
}

/// Stores records in `<root>/.taskdag/state.json`.
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE_PATH)
    }

    fn load_all(&self) -> Result<BTreeMap<String, TaskRecord>> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let file = File::open(&path)
            .with_context(|| format!("opening state file at {path:?}"))?;
        let map = serde_json::from_reader(BufReader::new(file))?;
        Ok(map)
    }

    fn save_all(&self, map: &BTreeMap<String, TaskRecord>) -> Result<()> {
        let path = self.state_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating state directory at {parent:?}"))?;
        }
        let file = File::create(&path)
            .with_context(|| format!("creating state file at {path:?}"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), map)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load(&self, key: &str) -> Result<Option<TaskRecord>> {
        Ok(self.load_all()?.remove(key))
    }

    fn save(&mut self, key: &str, record: TaskRecord) -> Result<()> {
        let mut map = self.load_all()?;
        map.insert(key.to_string(), record);
        self.save_all(&map)?;
        debug!(key, "stored task record (file)");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut map = self.load_all()?;
        if map.remove(key).is_some() {
            self.save_all(&map)?;
        }
        Ok(())
    }

    fn prune(&mut self, active_keys: &[&str]) -> Result<()> {
        let mut map = self.load_all()?;
        let initial_len = map.len();
        map.retain(|k, _| active_keys.contains(&k.as_str()));
        if map.len() < initial_len {
            self.save_all(&map)?;
            info!(removed = initial_len - map.len(), "pruned stale task records (file)");
        }
        Ok(())
    }
}

/// Stores records in memory only (lost on restart).
#[derive(Default)]
pub struct MemoryStateStore {
    map: BTreeMap<String, TaskRecord>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, key: &str) -> Result<Option<TaskRecord>> {
        Ok(self.map.get(key).cloned())
    }

    fn save(&mut self, key: &str, record: TaskRecord) -> Result<()> {
        self.map.insert(key.to_string(), record);
        debug!(key, "stored task record (memory)");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    fn prune(&mut self, active_keys: &[&str]) -> Result<()> {
        self.map.retain(|k, _| active_keys.contains(&k.as_str()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Fingerprint;
    use serde_json::json;

    fn record(ms: u64) -> TaskRecord {
        TaskRecord {
            fingerprint: Some(Fingerprint::of("t", &json!(ms))),
            last_success_ms: ms,
            last_run_ms: ms,
        }
    }

    #[test]
    fn memory_store_round_trips_and_prunes() {
        let mut store = MemoryStateStore::new();
        store.save("compile:a", record(10)).unwrap();
        store.save("compile:b", record(20)).unwrap();

        assert_eq!(store.load("compile:a").unwrap(), Some(record(10)));
        assert_eq!(store.load("missing").unwrap(), None);

        store.prune(&["compile:b"]).unwrap();
        assert_eq!(store.load("compile:a").unwrap(), None);
        assert_eq!(store.load("compile:b").unwrap(), Some(record(20)));
    }

    #[test]
    fn file_store_round_trips_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let mut store = FileStateStore::new(dir.path());
        store.save("link:app", record(30)).unwrap();
        store.save("compile:a", record(40)).unwrap();
        assert!(dir.path().join(STATE_FILE_PATH).exists());

        // A fresh instance over the same root sees the same records.
        let mut reopened = FileStateStore::new(dir.path());
        assert_eq!(reopened.load("link:app").unwrap(), Some(record(30)));

        reopened.remove("link:app").unwrap();
        reopened.prune(&[]).unwrap();
        let empty = FileStateStore::new(dir.path());
        assert_eq!(empty.load("compile:a").unwrap(), None);
    }

    #[test]
    fn record_last_success_zero_means_none() {
        let mut rec = record(0);
        rec.last_success_ms = 0;
        assert_eq!(rec.last_success(), None);
        assert!(record(5).last_success().is_some());
    }
}
