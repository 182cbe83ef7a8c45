//! Vista Core: Traits and types for partitioned materialized views
//!
//! This crate defines the abstractions a vista view is built from:
//! - Log transport: per-partition ordered record streams with cooperative cancellation
//! - Topic discovery: partition listing and oldest/newest offset lookup
//! - Physical storage: per-partition KV with a recovery bookmark
//! - Codecs: value encoding at the read boundary
//! - Hashers: pluggable 32-bit key hashing for partition routing
//!
//! Backends (file log, LMDB, in-memory) implement these traits in their own
//! crates; the `vista` crate composes them into a replicated view.

pub mod config;
pub mod error;
pub mod hasher;
pub mod observe;
pub mod traits;
pub mod types;

pub use config::{FileLogConfig, LmdbStorageConfig, SyncMode, ViewConfig};
pub use error::{Errors, Result, VistaError};
pub use hasher::{hash_key, Hasher32, HasherFactory, Murmur2Hasher, XxHash32Hasher};
pub use traits::{
    default_update, Codec, Consumer, PartitionConsumer, Storage, StorageIter, TopicManager,
    UpdateCallback,
};
pub use types::{Offset, OffsetPosition, PartitionId, Record};
