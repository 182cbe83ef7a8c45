use crate::error::Result;
use crate::types::{Offset, OffsetPosition, PartitionId, Record};
use async_trait::async_trait;

/// Partition and offset discovery for topics
pub trait TopicManager: Send + Sync {
    /// Partition ids of `topic`
    fn partitions(&self, topic: &str) -> Result<Vec<PartitionId>>;

    /// Oldest available offset, or the high-water mark (next offset to be written)
    fn get_offset(
        &self,
        topic: &str,
        partition: PartitionId,
        position: OffsetPosition,
    ) -> Result<Offset>;

    fn close(&self) -> Result<()>;
}

/// Log transport: opens ordered record streams for single partitions
pub trait Consumer: Send + Sync {
    /// Start consuming `partition` of `topic` at `offset` (inclusive)
    fn consume_partition(
        &self,
        topic: &str,
        partition: PartitionId,
        offset: Offset,
    ) -> Result<Box<dyn PartitionConsumer>>;
}

/// An ordered, possibly infinite stream of records from one partition
///
/// `next_record` must be cancel-safe: the partition task races it against its
/// cancellation token and drops the future when the token fires.
#[async_trait]
pub trait PartitionConsumer: Send {
    /// Next record in log order.
    ///
    /// `None` when the stream has ended, `Some(Err(_))` on a fatal transport
    /// failure after which the stream must not be polled again.
    async fn next_record(&mut self) -> Option<Result<Record>>;
}
