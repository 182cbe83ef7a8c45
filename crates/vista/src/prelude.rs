//! Vista Prelude
//!
//! ```
//! use vista::prelude::*;
//! ```

// Core types
pub use crate::{Errors, Offset, OffsetPosition, PartitionId, Record, Result, VistaError};

// View
pub use crate::{PartitionState, PartitionStats, View, ViewOptions, ViewState};

// Traits
pub use crate::{Codec, Consumer, PartitionConsumer, Storage, TopicManager};

// Strategies
pub use crate::{
    default_update, BytesCodec, HasherFactory, Int64Codec, JsonCodec, MemoryStorage,
    Murmur2Hasher, StringCodec, UpdateCallback, ViewConfig, XxHash32Hasher,
};

// Re-export common external deps
pub use crate::CancellationToken;
pub use std::sync::Arc;
pub use tracing;
