//! State store (spec.md §6): optional persistence for recovery. Backtest
//! runs without one; live mode checkpoints after every bar so a restart
//! can resume instead of replaying from the start of the feed.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything a `PlayEngine` needs to resume mid-run: the last processed
/// bar index per symbol and the exec adapter's last known account state.
/// Feed/indicator/structure state is intentionally excluded — it is
/// rebuilt by replaying from the data provider's own history, which is
/// assumed to always be available on restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub last_bar_index: HashMap<String, usize>,
    pub equity: f64,
}

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("no saved state for engine '{0}'")]
    NotFound(String),

    #[error("failed to read state file {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to decode saved state: {0}")]
    Decode(#[from] serde_json::Error),
}

pub trait StateStore {
    fn save(&mut self, engine_id: &str, snapshot: &EngineSnapshot) -> Result<(), StateStoreError>;
    fn load(&self, engine_id: &str) -> Result<EngineSnapshot, StateStoreError>;
}

/// Backtest's state store: holds the latest snapshot per engine id in
/// memory, discarded when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    snapshots: HashMap<String, EngineSnapshot>,
}

impl StateStore for InMemoryStateStore {
    fn save(&mut self, engine_id: &str, snapshot: &EngineSnapshot) -> Result<(), StateStoreError> {
        self.snapshots.insert(engine_id.to_string(), snapshot.clone());
        Ok(())
    }

    fn load(&self, engine_id: &str) -> Result<EngineSnapshot, StateStoreError> {
        self.snapshots.get(engine_id).cloned().ok_or_else(|| StateStoreError::NotFound(engine_id.to_string()))
    }
}

/// Live mode's state store: one JSON file per engine id under `dir`, so a
/// process restart can recover the last checkpoint from disk.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, engine_id: &str) -> PathBuf {
        self.dir.join(format!("{engine_id}.json"))
    }
}

impl StateStore for FileStateStore {
    fn save(&mut self, engine_id: &str, snapshot: &EngineSnapshot) -> Result<(), StateStoreError> {
        let path = self.path_for(engine_id);
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json).map_err(|source| StateStoreError::Io { path, source })
    }

    fn load(&self, engine_id: &str) -> Result<EngineSnapshot, StateStoreError> {
        let path = self.path_for(engine_id);
        let contents = fs::read_to_string(&path).map_err(|source| StateStoreError::Io { path, source })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> EngineSnapshot {
        let mut last_bar_index = HashMap::new();
        last_bar_index.insert("BTCUSDT".to_string(), 42);
        EngineSnapshot { last_bar_index, equity: 10_500.0 }
    }

    #[test]
    fn in_memory_round_trips() {
        let mut store = InMemoryStateStore::default();
        store.save("engine-1", &snapshot()).unwrap();
        let loaded = store.load("engine-1").unwrap();
        assert_eq!(loaded.equity, 10_500.0);
    }

    #[test]
    fn in_memory_missing_engine_is_not_found() {
        let store = InMemoryStateStore::default();
        assert!(matches!(store.load("nope"), Err(StateStoreError::NotFound(_))));
    }

    #[test]
    fn file_store_round_trips_via_tempdir() {
        let dir = std::env::temp_dir().join(format!("trendlab-core-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let mut store = FileStateStore::new(&dir);
        store.save("engine-2", &snapshot()).unwrap();
        let loaded = store.load("engine-2").unwrap();
        assert_eq!(loaded.last_bar_index["BTCUSDT"], 42);
        fs::remove_dir_all(&dir).ok();
    }
}
