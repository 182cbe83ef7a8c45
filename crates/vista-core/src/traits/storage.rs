use crate::error::Result;
use crate::types::Offset;

/// Iterator over the `(key, raw value)` pairs of one storage
pub type StorageIter = Box<dyn Iterator<Item = Result<(String, Vec<u8>)>> + Send>;

/// Physical storage for one partition of a view
///
/// Implementations must tolerate one writer (the partition's own task)
/// running concurrently with any number of readers, which is why every
/// method takes `&self`.
///
/// The recovery bookmark is kept next to the data so that a restarted view
/// resumes where it stopped instead of replaying the whole log.
pub trait Storage: Send + Sync {
    /// Raw bytes stored for `key`, `None` when absent
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn has(&self, key: &str) -> Result<bool>;

    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Offset of the last applied record, `None` if nothing was ever applied
    fn get_offset(&self) -> Result<Option<Offset>>;

    fn set_offset(&self, offset: Offset) -> Result<()>;

    /// Called once per recovery pass, when the partition has caught up to
    /// the high-water mark it observed at the start of the pass.
    fn mark_recovered(&self) -> Result<()> {
        Ok(())
    }

    /// Snapshot iteration over all stored keys (the bookmark is not included)
    fn iter(&self) -> Result<StorageIter>;

    /// Release the underlying handle
    fn close(&self) -> Result<()>;
}
