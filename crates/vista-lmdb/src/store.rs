use chrono::{DateTime, Utc};
use lmdb::{Cursor, Database, DatabaseFlags, Environment, EnvironmentFlags, Transaction, WriteFlags};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vista_core::{
    LmdbStorageConfig, Offset, PartitionId, Result, Storage, StorageIter, SyncMode, VistaError,
};

use crate::keys::{bytes_to_offset, meta_keys, offset_to_bytes};

/// Same shape as the view's storage builder
pub type LmdbStorageBuilder =
    Arc<dyn Fn(&str, PartitionId) -> Result<Arc<dyn Storage>> + Send + Sync>;

fn storage_err(e: lmdb::Error) -> VistaError {
    VistaError::Storage(e.to_string())
}

struct Handles {
    env: Arc<Environment>,
    state_db: Database,
    meta_db: Database,
}

/// LMDB-backed storage for one partition of a view
///
/// Each (topic, partition) pair owns an environment in
/// `<base_dir>/<topic>/partition-NNNNN` with two databases: `state` holds
/// the view's keys and raw values, `meta` holds the recovery bookmark and
/// bookkeeping timestamps. Every write is its own committed transaction,
/// so readers never see a partially applied record.
///
/// LMDB does not support opening the same environment twice in one
/// process; close (or drop) a storage before reopening its partition.
pub struct LmdbStorage {
    path: PathBuf,
    handles: RwLock<Option<Handles>>,
}

impl LmdbStorage {
    /// Directory of the environment for `partition` of `topic`
    pub fn partition_path(base_dir: &Path, topic: &str, partition: PartitionId) -> PathBuf {
        base_dir.join(topic).join(format!("partition-{:05}", partition))
    }

    pub fn open(config: &LmdbStorageConfig, topic: &str, partition: PartitionId) -> Result<Self> {
        let invalid = topic.is_empty()
            || topic == "."
            || topic == ".."
            || topic.contains(|c: char| c == '/' || c == '\\');
        if invalid {
            return Err(VistaError::Config(format!("invalid topic name {:?}", topic)));
        }
        let path = Self::partition_path(&config.base_dir, topic, partition);
        std::fs::create_dir_all(&path)?;

        let mut env_builder = Environment::new();
        env_builder.set_max_dbs(2); // state, meta
        env_builder.set_map_size(config.map_size);
        env_builder.set_max_readers(config.max_readers);

        let mut flags = EnvironmentFlags::empty();
        match config.sync_mode {
            SyncMode::Full => {}
            SyncMode::NoMetaSync => flags.insert(EnvironmentFlags::NO_META_SYNC),
            SyncMode::NoSync => flags.insert(EnvironmentFlags::NO_SYNC),
        }
        env_builder.set_flags(flags);

        let env = env_builder.open(&path).map_err(storage_err)?;
        let state_db = env
            .create_db(Some("state"), DatabaseFlags::empty())
            .map_err(storage_err)?;
        let meta_db = env
            .create_db(Some("meta"), DatabaseFlags::empty())
            .map_err(storage_err)?;

        {
            let mut txn = env.begin_rw_txn().map_err(storage_err)?;
            if txn.get(meta_db, &meta_keys::SCHEMA_VERSION).is_err() {
                txn.put(meta_db, &meta_keys::SCHEMA_VERSION, &"1", WriteFlags::empty())
                    .map_err(storage_err)?;
            }
            if txn.get(meta_db, &meta_keys::CREATED_AT).is_err() {
                let now = Utc::now().to_rfc3339();
                txn.put(meta_db, &meta_keys::CREATED_AT, &now, WriteFlags::empty())
                    .map_err(storage_err)?;
            }
            txn.commit().map_err(storage_err)?;
        }

        tracing::debug!(path = %path.display(), topic, partition, "opened lmdb storage");
        Ok(Self {
            path,
            handles: RwLock::new(Some(Handles {
                env: Arc::new(env),
                state_db,
                meta_db,
            })),
        })
    }

    /// Storage factory for views: opens one environment per partition under
    /// `config.base_dir`
    pub fn builder(config: LmdbStorageConfig) -> LmdbStorageBuilder {
        Arc::new(move |topic: &str, partition: PartitionId| -> Result<Arc<dyn Storage>> {
            Ok(Arc::new(LmdbStorage::open(&config, topic, partition)?))
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.handles.read().is_none()
    }

    /// When the partition last finished a recovery pass, if ever
    pub fn recovered_at(&self) -> Result<Option<DateTime<Utc>>> {
        let raw = self.with_handles(|h| read_meta(h, meta_keys::RECOVERED_AT))?;
        raw.map(|bytes| {
            let text = String::from_utf8_lossy(&bytes).to_string();
            DateTime::parse_from_rfc3339(&text)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| VistaError::Storage(format!("corrupt recovered_at {:?}: {}", text, e)))
        })
        .transpose()
    }

    fn with_handles<T>(&self, f: impl FnOnce(&Handles) -> Result<T>) -> Result<T> {
        let guard = self.handles.read();
        match guard.as_ref() {
            Some(handles) => f(handles),
            None => Err(VistaError::Storage(format!(
                "storage {} is closed",
                self.path.display()
            ))),
        }
    }

    /// Run `f` in a write transaction and commit it
    fn write(
        &self,
        f: impl FnOnce(&Handles, &mut lmdb::RwTransaction<'_>) -> Result<()>,
    ) -> Result<()> {
        self.with_handles(|h| {
            let mut txn = h.env.begin_rw_txn().map_err(storage_err)?;
            f(h, &mut txn)?;
            txn.commit().map_err(storage_err)
        })
    }
}

fn read_meta(h: &Handles, key: &str) -> Result<Option<Vec<u8>>> {
    let txn = h.env.begin_ro_txn().map_err(storage_err)?;
    let value = match txn.get(h.meta_db, &key) {
        Ok(bytes) => Some(bytes.to_vec()),
        Err(lmdb::Error::NotFound) => None,
        Err(e) => return Err(storage_err(e)),
    };
    Ok(value)
}

impl Storage for LmdbStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_handles(|h| {
            let txn = h.env.begin_ro_txn().map_err(storage_err)?;
            let value = match txn.get(h.state_db, &key) {
                Ok(bytes) => Some(bytes.to_vec()),
                Err(lmdb::Error::NotFound) => None,
                Err(e) => return Err(storage_err(e)),
            };
            Ok(value)
        })
    }

    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.write(|h, txn| {
            txn.put(h.state_db, &key, &value, WriteFlags::empty())
                .map_err(storage_err)
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.write(|h, txn| match txn.del(h.state_db, &key, None) {
            Ok(()) | Err(lmdb::Error::NotFound) => Ok(()),
            Err(e) => Err(storage_err(e)),
        })
    }

    fn get_offset(&self) -> Result<Option<Offset>> {
        let raw = self.with_handles(|h| read_meta(h, meta_keys::OFFSET))?;
        match raw {
            None => Ok(None),
            Some(bytes) => bytes_to_offset(&bytes).map(Some).ok_or_else(|| {
                VistaError::Storage(format!(
                    "corrupt offset bookmark in {} ({} bytes)",
                    self.path.display(),
                    bytes.len()
                ))
            }),
        }
    }

    fn set_offset(&self, offset: Offset) -> Result<()> {
        let bytes = offset_to_bytes(offset);
        self.write(|h, txn| {
            txn.put(h.meta_db, &meta_keys::OFFSET, &bytes, WriteFlags::empty())
                .map_err(storage_err)
        })
    }

    fn mark_recovered(&self) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.write(|h, txn| {
            txn.put(h.meta_db, &meta_keys::RECOVERED_AT, &now, WriteFlags::empty())
                .map_err(storage_err)
        })?;
        // Bulk recovery may have run unsynced; make it durable once.
        self.with_handles(|h| h.env.sync(true).map_err(storage_err))
    }

    /// Snapshot of the `state` database, collected up front so no LMDB
    /// transaction outlives the call
    fn iter(&self) -> Result<StorageIter> {
        let entries = self.with_handles(|h| {
            let txn = h.env.begin_ro_txn().map_err(storage_err)?;
            let mut entries = Vec::new();
            {
                let mut cursor = txn.open_ro_cursor(h.state_db).map_err(storage_err)?;
                for (key, value) in cursor.iter_start() {
                    let entry = String::from_utf8(key.to_vec())
                        .map(|key| (key, value.to_vec()))
                        .map_err(|e| VistaError::Codec(format!("non utf-8 key in storage: {}", e)));
                    entries.push(entry);
                }
            }
            Ok(entries)
        })?;
        Ok(Box::new(entries.into_iter()))
    }

    fn close(&self) -> Result<()> {
        let Some(handles) = self.handles.write().take() else {
            return Ok(());
        };
        handles.env.sync(true).map_err(storage_err)?;
        tracing::debug!(path = %self.path.display(), "closed lmdb storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (LmdbStorage, LmdbStorageConfig, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = LmdbStorageConfig::new(temp_dir.path()).with_map_size(16 * 1024 * 1024);
        let storage = LmdbStorage::open(&config, "accounts", 0).unwrap();
        (storage, config, temp_dir)
    }

    #[test]
    fn test_basic_operations() {
        let (storage, _config, _temp) = setup();

        assert_eq!(storage.get("k").unwrap(), None);
        assert!(!storage.has("k").unwrap());

        storage.set("k", b"v1").unwrap();
        assert_eq!(storage.get("k").unwrap(), Some(b"v1".to_vec()));
        storage.set("k", b"v2").unwrap();
        assert_eq!(storage.get("k").unwrap(), Some(b"v2".to_vec()));
        assert!(storage.has("k").unwrap());

        storage.delete("k").unwrap();
        assert!(!storage.has("k").unwrap());
        // Deleting an absent key is fine.
        storage.delete("k").unwrap();
    }

    #[test]
    fn test_offset_bookmark() {
        let (storage, _config, _temp) = setup();
        assert_eq!(storage.get_offset().unwrap(), None);
        storage.set_offset(41).unwrap();
        storage.set_offset(42).unwrap();
        assert_eq!(storage.get_offset().unwrap(), Some(42));
    }

    #[test]
    fn test_bookmark_not_in_iteration() {
        let (storage, _config, _temp) = setup();
        storage.set("b", b"2").unwrap();
        storage.set("a", b"1").unwrap();
        storage.set_offset(7).unwrap();

        let entries: Vec<(String, Vec<u8>)> = storage.iter().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(
            entries,
            vec![("a".to_string(), b"1".to_vec()), ("b".to_string(), b"2".to_vec())]
        );
    }

    #[test]
    fn test_reopen_keeps_data_and_bookmark() {
        let (storage, config, _temp) = setup();
        storage.set("alice", b"10").unwrap();
        storage.set_offset(3).unwrap();
        storage.close().unwrap();
        drop(storage);

        let storage = LmdbStorage::open(&config, "accounts", 0).unwrap();
        assert_eq!(storage.get("alice").unwrap(), Some(b"10".to_vec()));
        assert_eq!(storage.get_offset().unwrap(), Some(3));
    }

    #[test]
    fn test_partitions_are_isolated() {
        let (p0, config, _temp) = setup();
        let p1 = LmdbStorage::open(&config, "accounts", 1).unwrap();
        p0.set("k", b"0").unwrap();
        p0.set_offset(9).unwrap();

        assert!(!p1.has("k").unwrap());
        assert_eq!(p1.get_offset().unwrap(), None);
        assert_ne!(p0.path(), p1.path());
    }

    #[test]
    fn test_mark_recovered_records_time() {
        let (storage, _config, _temp) = setup();
        assert_eq!(storage.recovered_at().unwrap(), None);
        let before = Utc::now() - chrono::Duration::seconds(1);
        storage.mark_recovered().unwrap();
        let at = storage.recovered_at().unwrap().unwrap();
        assert!(at >= before);
    }

    #[test]
    fn test_closed_storage_rejects_operations() {
        let (storage, _config, _temp) = setup();
        storage.close().unwrap();
        assert!(storage.is_closed());
        assert!(matches!(storage.get("k"), Err(VistaError::Storage(_))));
        assert!(storage.set_offset(1).is_err());
        assert!(storage.iter().is_err());
        // Closing twice is a no-op.
        storage.close().unwrap();
    }

    #[test]
    fn test_invalid_topic_name() {
        let temp_dir = TempDir::new().unwrap();
        let config = LmdbStorageConfig::new(temp_dir.path());
        assert!(matches!(
            LmdbStorage::open(&config, "../escape", 0),
            Err(VistaError::Config(_))
        ));
    }

    #[test]
    fn test_no_sync_mode_opens() {
        let temp_dir = TempDir::new().unwrap();
        let config = LmdbStorageConfig::new(temp_dir.path())
            .with_map_size(16 * 1024 * 1024)
            .with_sync_mode(SyncMode::NoSync);
        let storage = LmdbStorage::open(&config, "t", 0).unwrap();
        storage.set("k", b"v").unwrap();
        storage.mark_recovered().unwrap();
        assert!(storage.has("k").unwrap());
    }
}
