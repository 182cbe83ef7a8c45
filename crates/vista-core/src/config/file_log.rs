use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the file-backed partitioned topic log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLogConfig {
    /// Base directory; each topic gets a subdirectory
    pub base_dir: PathBuf,

    /// Partition count used when a topic is created
    /// Default: 4
    #[serde(default = "default_partitions")]
    pub partitions: u32,

    /// Buffer size for writes
    /// Default: 64KB
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,

    /// Maximum size of a single record key + value (bytes)
    /// Default: 4MB
    #[serde(default = "default_max_record_size")]
    pub max_record_size: usize,

    /// How long a caught-up consumer sleeps before re-reading the file when
    /// no in-process append notification arrives (milliseconds)
    /// Default: 50ms
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Flush the write buffer after each append
    /// Default: true
    #[serde(default = "default_flush_on_append")]
    pub flush_on_append: bool,
}

fn default_partitions() -> u32 {
    4
}

fn default_write_buffer_size() -> usize {
    64 * 1024
}

fn default_max_record_size() -> usize {
    4 * 1024 * 1024
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_flush_on_append() -> bool {
    true
}

impl FileLogConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            partitions: default_partitions(),
            write_buffer_size: default_write_buffer_size(),
            max_record_size: default_max_record_size(),
            poll_interval_ms: default_poll_interval_ms(),
            flush_on_append: default_flush_on_append(),
        }
    }

    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = size;
        self
    }

    pub fn with_flush_on_append(mut self, flush: bool) -> Self {
        self.flush_on_append = flush;
        self
    }
}
