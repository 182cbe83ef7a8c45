use crate::memory::MemoryStorage;
use std::fmt;
use std::sync::Arc;
use vista_core::{
    default_update, Codec, Consumer, HasherFactory, Murmur2Hasher, PartitionId, Result, Storage,
    TopicManager, UpdateCallback, ViewConfig, VistaError,
};

/// Creates the storage of one partition of a view
pub type StorageBuilder =
    Arc<dyn Fn(&str, PartitionId) -> Result<Arc<dyn Storage>> + Send + Sync>;

/// Creates the partition/offset discovery client from the broker list
pub type TopicManagerBuilder =
    Arc<dyn Fn(&[String]) -> Result<Arc<dyn TopicManager>> + Send + Sync>;

/// Creates the log transport from the broker list and client id
pub type ConsumerBuilder =
    Arc<dyn Fn(&[String], &str) -> Result<Arc<dyn Consumer>> + Send + Sync>;

/// Strategy objects and settings a view is constructed from
///
/// Every field can be overridden on its own. `new` installs the defaults:
/// Murmur2 routing, [`default_update`] merge semantics, in-memory storage.
/// There is no default transport; a view built without a topic manager and
/// consumer builder fails construction.
pub struct ViewOptions<C: Codec> {
    pub codec: C,
    pub hasher: HasherFactory,
    pub update: UpdateCallback,
    pub storage_builder: StorageBuilder,
    pub topic_manager_builder: Option<TopicManagerBuilder>,
    pub consumer_builder: Option<ConsumerBuilder>,
    pub config: ViewConfig,
}

impl<C: Codec> ViewOptions<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            hasher: Murmur2Hasher::factory(),
            update: Arc::new(default_update),
            storage_builder: MemoryStorage::builder(),
            topic_manager_builder: None,
            consumer_builder: None,
            config: ViewConfig::default(),
        }
    }

    pub fn with_hasher(mut self, hasher: HasherFactory) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_update(mut self, update: UpdateCallback) -> Self {
        self.update = update;
        self
    }

    pub fn with_storage_builder(mut self, builder: StorageBuilder) -> Self {
        self.storage_builder = builder;
        self
    }

    pub fn with_topic_manager_builder(mut self, builder: TopicManagerBuilder) -> Self {
        self.topic_manager_builder = Some(builder);
        self
    }

    pub fn with_consumer_builder(mut self, builder: ConsumerBuilder) -> Self {
        self.consumer_builder = Some(builder);
        self
    }

    pub fn with_config(mut self, config: ViewConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_restartable(mut self, restartable: bool) -> Self {
        self.config.restartable = restartable;
        self
    }

    /// Both transport builders, or a `Config` error naming the missing one
    pub(crate) fn transport_builders(&self) -> Result<(TopicManagerBuilder, ConsumerBuilder)> {
        let tmgr = self
            .topic_manager_builder
            .clone()
            .ok_or_else(|| VistaError::Config("no topic manager builder configured".into()))?;
        let consumer = self
            .consumer_builder
            .clone()
            .ok_or_else(|| VistaError::Config("no consumer builder configured".into()))?;
        Ok((tmgr, consumer))
    }
}

impl<C: Codec> fmt::Debug for ViewOptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewOptions")
            .field("codec", &self.codec.name())
            .field("topic_manager_builder", &self.topic_manager_builder.is_some())
            .field("consumer_builder", &self.consumer_builder.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StringCodec;

    #[test]
    fn test_defaults() {
        let opts = ViewOptions::new(StringCodec);
        assert!(!opts.config.restartable);
        assert!(opts.topic_manager_builder.is_none());
        assert!(matches!(
            opts.transport_builders(),
            Err(VistaError::Config(_))
        ));

        // Default storage is a fresh in-memory store per partition.
        let a = (opts.storage_builder)("t", 0).unwrap();
        let b = (opts.storage_builder)("t", 1).unwrap();
        a.set("k", b"v").unwrap();
        assert!(!b.has("k").unwrap());
    }

    #[test]
    fn test_default_update_handles_tombstones() {
        let opts = ViewOptions::new(StringCodec);
        let st = MemoryStorage::new();
        (opts.update)(&st, 0, "k", b"v").unwrap();
        assert_eq!(st.get("k").unwrap(), Some(b"v".to_vec()));
        (opts.update)(&st, 0, "k", b"").unwrap();
        assert_eq!(st.get("k").unwrap(), None);
    }
}
