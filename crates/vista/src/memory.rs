//! In-memory view storage
//!
//! The default storage of a view: nothing survives the process, so every
//! start replays the partition from its oldest offset.

use crate::options::StorageBuilder;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vista_core::{Offset, PartitionId, Result, Storage, StorageIter, VistaError};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    offset: RwLock<Option<Offset>>,
    recovered: AtomicBool,
    closed: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder producing a fresh, empty storage per partition.
    pub fn builder() -> StorageBuilder {
        fn build(_topic: &str, _partition: PartitionId) -> Result<Arc<dyn Storage>> {
            Ok(Arc::new(MemoryStorage::new()))
        }
        Arc::new(build)
    }

    /// Whether `mark_recovered` was called since creation
    pub fn is_recovered(&self) -> bool {
        self.recovered.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(VistaError::Storage("memory storage is closed".into()));
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.data.read().get(key).cloned())
    }

    fn has(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.data.read().contains_key(key))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.data.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.ensure_open()?;
        self.data.write().remove(key);
        Ok(())
    }

    fn get_offset(&self) -> Result<Option<Offset>> {
        self.ensure_open()?;
        Ok(*self.offset.read())
    }

    fn set_offset(&self, offset: Offset) -> Result<()> {
        self.ensure_open()?;
        *self.offset.write() = Some(offset);
        Ok(())
    }

    fn mark_recovered(&self) -> Result<()> {
        self.recovered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn iter(&self) -> Result<StorageIter> {
        self.ensure_open()?;
        let snapshot: Vec<_> = self
            .data
            .read()
            .iter()
            .map(|(k, v)| Ok((k.clone(), v.clone())))
            .collect();
        Ok(Box::new(snapshot.into_iter()))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
