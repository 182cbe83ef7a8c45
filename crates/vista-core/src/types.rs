use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Partition identifier; partitions of a topic are dense, `0..n`.
pub type PartitionId = i32;

/// Position of a record within its partition log.
pub type Offset = i64;

/// Which end of a partition log an offset query refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffsetPosition {
    /// Offset of the oldest record still available.
    Oldest,
    /// High-water mark: the offset the next appended record will get.
    Newest,
}

/// A single record of a partitioned topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub topic: String,
    pub partition: PartitionId,
    pub offset: Offset,
    pub key: String,
    /// Raw value bytes. An empty value is a tombstone.
    pub value: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(
        topic: impl Into<String>,
        partition: PartitionId,
        offset: Offset,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: key.into(),
            value: value.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }
}
