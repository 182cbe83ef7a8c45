//! LMDB-backed partition storage for vista views
//!
//! [`LmdbStorage`] keeps one LMDB environment per (topic, partition) with
//! the view's keys in a `state` database and the recovery bookmark in a
//! `meta` database, so a restarted view resumes from where it stopped.
//!
//! ```no_run
//! use vista_core::{LmdbStorageConfig, Storage};
//! use vista_lmdb::LmdbStorage;
//!
//! let builder = LmdbStorage::builder(LmdbStorageConfig::new("./data/views"));
//! let storage = builder("accounts", 0).unwrap();
//! storage.set("alice", b"10").unwrap();
//! ```

pub mod keys;
pub mod store;

pub use store::{LmdbStorage, LmdbStorageBuilder};
pub use vista_core::{LmdbStorageConfig, SyncMode};
