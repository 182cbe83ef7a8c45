use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for LMDB-backed view storage
///
/// Every (topic, partition) pair gets its own environment under `base_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmdbStorageConfig {
    pub base_dir: PathBuf,

    /// Maximum map size per partition (bytes)
    /// Default: 1GB
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Maximum concurrent read transactions
    /// Default: 126
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,

    #[serde(default)]
    pub sync_mode: SyncMode,
}

/// Durability of LMDB commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    /// Flush data and metadata on every commit
    #[default]
    Full,
    /// Skip metadata flush; the last commit may be lost on crash
    NoMetaSync,
    /// Leave flushing to the OS
    NoSync,
}

fn default_map_size() -> usize {
    1024 * 1024 * 1024
}

fn default_max_readers() -> u32 {
    126
}

impl LmdbStorageConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            map_size: default_map_size(),
            max_readers: default_max_readers(),
            sync_mode: SyncMode::default(),
        }
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }
}
