//! Statistics Persistence
//!
//! `StatsStore` is the narrow read/write contract the ledger needs. The JSON
//! store keeps one file per player:
//!
//! ```text
//! <dir>/<player-uuid>.json
//! { "arenas": { "<arena>": { "kills": 3, "rating": 1523, ... } } }
//! ```
//!
//! Writes go to a temporary file first and are renamed into place, so a
//! failed write never leaves a truncated record behind.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::id::PlayerId;
use crate::stats::ledger::StatsRecord;

/// Persistence failures.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem failure.
    #[error("stats I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Stored file is not valid stats JSON.
    #[error("invalid stats JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Store refused the write.
    #[error("stats store unavailable")]
    Unavailable,
}

/// Key-value persistence for statistics records.
pub trait StatsStore: Send + Sync {
    /// Record for (player, arena), or `None` if never written.
    fn read(&self, player: PlayerId, arena: &str) -> Result<Option<StatsRecord>, PersistError>;

    /// Replace the record for (player, arena).
    fn write(&self, player: PlayerId, arena: &str, record: &StatsRecord) -> Result<(), PersistError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlayerFile {
    #[serde(default)]
    arenas: BTreeMap<String, StatsRecord>,
}

/// One JSON file per player under a data directory.
#[derive(Debug, Clone)]
pub struct JsonStatsStore {
    dir: PathBuf,
}

impl JsonStatsStore {
    /// Store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, player: PlayerId) -> PathBuf {
        self.dir.join(format!("{}.json", player.to_uuid_string()))
    }

    fn read_file(&self, path: &Path) -> Result<PlayerFile, PersistError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PlayerFile::default()),
            Err(source) => Err(io_err(path)(source)),
        }
    }
}

impl StatsStore for JsonStatsStore {
    fn read(&self, player: PlayerId, arena: &str) -> Result<Option<StatsRecord>, PersistError> {
        let mut file = self.read_file(&self.file_for(player))?;
        Ok(file.arenas.remove(arena))
    }

    fn write(&self, player: PlayerId, arena: &str, record: &StatsRecord) -> Result<(), PersistError> {
        let path = self.file_for(player);
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let mut file = self.read_file(&path)?;
        file.arenas.insert(arena.to_string(), record.clone());

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&file)?).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_err(&path))
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PersistError {
    let path = path.to_path_buf();
    move |source| PersistError::Io { path, source }
}

/// In-memory store, with a switch to simulate write failures.
#[derive(Debug, Default)]
pub struct MemoryStatsStore {
    records: Mutex<BTreeMap<(PlayerId, String), StatsRecord>>,
    failing: AtomicBool,
}

impl MemoryStatsStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// No records stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatsStore for MemoryStatsStore {
    fn read(&self, player: PlayerId, arena: &str) -> Result<Option<StatsRecord>, PersistError> {
        let records = self.records.lock().map_err(|_| PersistError::Unavailable)?;
        Ok(records.get(&(player, arena.to_string())).cloned())
    }

    fn write(&self, player: PlayerId, arena: &str, record: &StatsRecord) -> Result<(), PersistError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistError::Unavailable);
        }
        let mut records = self.records.lock().map_err(|_| PersistError::Unavailable)?;
        records.insert((player, arena.to_string()), record.clone());
        Ok(())
    }
}
