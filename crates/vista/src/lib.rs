//! Vista: replicated, partitioned materialized views
//!
//! A [`View`] mirrors one partitioned topic into local per-partition
//! storage. It replays each partition from its stored bookmark (or the
//! oldest record) up to the high-water mark seen at startup, then keeps
//! tailing. Point lookups are routed by key hash and served while recovery
//! and tailing are in progress.
//!
//! - [`Signal`]: enumerated state broadcast with single-fire waits
//! - [`StorageProxy`]: the only write path into a partition's storage
//! - [`PartitionTable`]: recovery and tailing of one partition
//! - [`View`]: coordination, routing and teardown across partitions
//!
//! Transports, discovery and storage engines plug in through the traits in
//! `vista-core`; [`tester::MemoryTopic`] and [`MemoryStorage`] are in-memory
//! implementations.

pub mod codec;
pub mod memory;
pub mod options;
pub mod partition_table;
pub mod prelude;
pub mod proxy;
pub mod signal;
pub mod tester;
pub mod view;

// Re-export core types
pub use vista_core::{
    config::{FileLogConfig, LmdbStorageConfig, SyncMode, ViewConfig},
    default_update,
    error::{Errors, Result, VistaError},
    hash_key,
    traits::{Codec, Consumer, PartitionConsumer, Storage, StorageIter, TopicManager, UpdateCallback},
    types::{Offset, OffsetPosition, PartitionId, Record},
    Hasher32, HasherFactory, Murmur2Hasher, XxHash32Hasher,
};

pub use codec::{BytesCodec, Int64Codec, JsonCodec, StringCodec};
pub use memory::MemoryStorage;
pub use options::{ConsumerBuilder, StorageBuilder, TopicManagerBuilder, ViewOptions};
pub use partition_table::{PartitionState, PartitionStats, PartitionTable};
pub use proxy::StorageProxy;
pub use signal::{Signal, StateWaiter};
pub use view::{View, ViewState};

pub use tokio_util::sync::CancellationToken;
