use std::fmt;
use std::sync::Arc;
use vista_core::{Offset, PartitionId, Result, Storage, StorageIter, UpdateCallback};

/// Mutation gateway into one partition's storage
///
/// Reads go straight to the storage. Writes only happen through
/// [`StorageProxy::update`], which hands the raw value to the view's update
/// callback, and through [`StorageProxy::delete`] for local eviction.
/// Values are never decoded here.
#[derive(Clone)]
pub struct StorageProxy {
    storage: Arc<dyn Storage>,
    partition: PartitionId,
    update: UpdateCallback,
}

impl StorageProxy {
    pub fn new(storage: Arc<dyn Storage>, partition: PartitionId, update: UpdateCallback) -> Self {
        Self {
            storage,
            partition,
            update,
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.storage.get(key)
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        self.storage.has(key)
    }

    /// Remove `key` locally. Nothing is written to the log.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.storage.delete(key)
    }

    /// Apply a raw log value through the update callback
    pub fn update(&self, key: &str, value: &[u8]) -> Result<()> {
        (self.update)(self.storage.as_ref(), self.partition, key, value)
    }

    pub fn get_offset(&self) -> Result<Option<Offset>> {
        self.storage.get_offset()
    }

    pub fn set_offset(&self, offset: Offset) -> Result<()> {
        self.storage.set_offset(offset)
    }

    pub fn mark_recovered(&self) -> Result<()> {
        self.storage.mark_recovered()
    }

    pub fn iter(&self) -> Result<StorageIter> {
        self.storage.iter()
    }

    /// Release the storage. Call at most once per opened storage.
    pub fn close(&self) -> Result<()> {
        self.storage.close()
    }
}

impl fmt::Debug for StorageProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageProxy")
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}
