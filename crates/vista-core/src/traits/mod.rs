pub mod codec;
pub mod log;
pub mod storage;

pub use codec::Codec;
pub use log::{Consumer, PartitionConsumer, TopicManager};
pub use storage::{Storage, StorageIter};

use crate::error::Result;
use crate::types::PartitionId;
use std::sync::Arc;

/// Merge function applied to every consumed record
///
/// Arguments are the partition's storage, the partition id, the record key
/// and its raw value. It runs once per record both while recovering and
/// while tailing, and is the only code path that writes to a view's storage.
pub type UpdateCallback =
    Arc<dyn Fn(&dyn Storage, PartitionId, &str, &[u8]) -> Result<()> + Send + Sync>;

/// Store the raw value, or delete the key when the value is a tombstone (empty).
pub fn default_update(
    storage: &dyn Storage,
    _partition: PartitionId,
    key: &str,
    value: &[u8],
) -> Result<()> {
    if value.is_empty() {
        storage.delete(key)
    } else {
        storage.set(key, value)
    }
}
