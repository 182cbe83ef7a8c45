//! In-memory partitioned topic for tests
//!
//! [`MemoryTopic`] implements both [`TopicManager`] and [`Consumer`], so a
//! view can be built against it without any external log. Records are
//! produced with [`MemoryTopic::produce`] (routed with the same hasher a view
//! uses) or [`MemoryTopic::produce_to`] (explicit partition). Consumers tail
//! the log and wake as soon as a record is appended.
//!
//! Failures can be injected per topic to exercise error paths.
//!
//! ```
//! use vista::tester::MemoryTopic;
//!
//! let log = MemoryTopic::new();
//! log.create_topic("balances", 2);
//! let (partition, offset) = log.produce("balances", "alice", b"10").unwrap();
//! assert!(partition < 2);
//! assert_eq!(offset, 0);
//! ```

use crate::options::{ConsumerBuilder, TopicManagerBuilder};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use vista_core::{
    hash_key, Consumer, HasherFactory, Murmur2Hasher, Offset, OffsetPosition, PartitionConsumer,
    PartitionId, Record, Result, TopicManager, VistaError,
};

/// Shared in-memory log. Clones refer to the same topics.
#[derive(Clone)]
pub struct MemoryTopic {
    inner: Arc<Inner>,
}

struct Inner {
    topics: Mutex<HashMap<String, Vec<Arc<PartitionLog>>>>,
    hasher: HasherFactory,
    faults: Mutex<Faults>,
    closes: AtomicUsize,
}

#[derive(Default)]
struct Faults {
    partitions: Option<String>,
    offsets: Option<String>,
}

struct PartitionLog {
    data: Mutex<PartitionData>,
    notify: Notify,
}

struct PartitionData {
    /// Offset of `records[0]`
    base: Offset,
    records: Vec<Record>,
    failure: Option<String>,
    ended: bool,
}

impl PartitionData {
    fn next_offset(&self) -> Offset {
        self.base + self.records.len() as Offset
    }
}

impl PartitionLog {
    fn new() -> Self {
        Self {
            data: Mutex::new(PartitionData {
                base: 0,
                records: Vec::new(),
                failure: None,
                ended: false,
            }),
            notify: Notify::new(),
        }
    }
}

impl Default for MemoryTopic {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTopic {
    pub fn new() -> Self {
        Self::with_hasher(Murmur2Hasher::factory())
    }

    /// Route produced keys with `hasher` instead of Murmur2
    pub fn with_hasher(hasher: HasherFactory) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                hasher,
                faults: Mutex::new(Faults::default()),
                closes: AtomicUsize::new(0),
            }),
        }
    }

    /// Create `topic` with `partitions` empty partitions. Existing topics are
    /// left untouched.
    pub fn create_topic(&self, topic: &str, partitions: usize) {
        self.inner
            .topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| (0..partitions).map(|_| Arc::new(PartitionLog::new())).collect());
    }

    /// Append a record to the partition `key` hashes to
    pub fn produce(&self, topic: &str, key: &str, value: &[u8]) -> Result<(PartitionId, Offset)> {
        let count = self.partition_logs(topic)?.len();
        let partition = hash_key(&self.inner.hasher, key, count)?;
        let offset = self.produce_to(topic, partition, key, value)?;
        Ok((partition, offset))
    }

    /// Append a record to an explicit partition
    pub fn produce_to(
        &self,
        topic: &str,
        partition: PartitionId,
        key: &str,
        value: &[u8],
    ) -> Result<Offset> {
        let log = self.partition_log(topic, partition)?;
        let offset = {
            let mut data = log.data.lock();
            let offset = data.next_offset();
            data.records.push(
                Record::new(topic, partition, offset, key, value).with_timestamp(Utc::now()),
            );
            offset
        };
        log.notify.notify_waiters();
        Ok(offset)
    }

    /// Drop every record below `offset`, as log retention would
    pub fn truncate(&self, topic: &str, partition: PartitionId, offset: Offset) -> Result<()> {
        let log = self.partition_log(topic, partition)?;
        let mut data = log.data.lock();
        let offset = offset.min(data.next_offset());
        if offset > data.base {
            let count = (offset - data.base) as usize;
            data.records.drain(..count);
            data.base = offset;
        }
        Ok(())
    }

    /// Make every consumer of the partition fail with `message` on its next read
    pub fn fail_partition(&self, topic: &str, partition: PartitionId, message: &str) -> Result<()> {
        let log = self.partition_log(topic, partition)?;
        log.data.lock().failure = Some(message.to_string());
        log.notify.notify_waiters();
        Ok(())
    }

    /// End every stream of the partition once it has delivered all records
    pub fn end_partition(&self, topic: &str, partition: PartitionId) -> Result<()> {
        let log = self.partition_log(topic, partition)?;
        log.data.lock().ended = true;
        log.notify.notify_waiters();
        Ok(())
    }

    /// Make `partitions()` fail with `message` (or succeed again with `None`)
    pub fn fail_partitions_query(&self, message: Option<&str>) {
        self.inner.faults.lock().partitions = message.map(str::to_string);
    }

    /// Make `get_offset()` fail with `message` (or succeed again with `None`)
    pub fn fail_offset_query(&self, message: Option<&str>) {
        self.inner.faults.lock().offsets = message.map(str::to_string);
    }

    /// How many times `close()` was called through any clone
    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn topic_manager_builder(&self) -> TopicManagerBuilder {
        let log = self.clone();
        Arc::new(move |_brokers: &[String]| -> Result<Arc<dyn TopicManager>> {
            Ok(Arc::new(log.clone()))
        })
    }

    pub fn consumer_builder(&self) -> ConsumerBuilder {
        let log = self.clone();
        Arc::new(
            move |_brokers: &[String], _client_id: &str| -> Result<Arc<dyn Consumer>> {
                Ok(Arc::new(log.clone()))
            },
        )
    }

    fn partition_logs(&self, topic: &str) -> Result<Vec<Arc<PartitionLog>>> {
        self.inner
            .topics
            .lock()
            .get(topic)
            .cloned()
            .ok_or_else(|| VistaError::Config(format!("unknown topic {:?}", topic)))
    }

    fn partition_log(&self, topic: &str, partition: PartitionId) -> Result<Arc<PartitionLog>> {
        let logs = self.partition_logs(topic)?;
        usize::try_from(partition)
            .ok()
            .and_then(|idx| logs.get(idx).cloned())
            .ok_or_else(|| {
                VistaError::Config(format!("unknown partition {} of topic {:?}", partition, topic))
            })
    }
}

fn injected(message: &str) -> VistaError {
    VistaError::Io(io::Error::new(io::ErrorKind::Other, message.to_string()))
}

impl TopicManager for MemoryTopic {
    fn partitions(&self, topic: &str) -> Result<Vec<PartitionId>> {
        if let Some(message) = &self.inner.faults.lock().partitions {
            return Err(injected(message));
        }
        let count = self.partition_logs(topic)?.len();
        Ok((0..count as PartitionId).collect())
    }

    fn get_offset(
        &self,
        topic: &str,
        partition: PartitionId,
        position: OffsetPosition,
    ) -> Result<Offset> {
        if let Some(message) = &self.inner.faults.lock().offsets {
            return Err(injected(message));
        }
        let log = self.partition_log(topic, partition)?;
        let data = log.data.lock();
        Ok(match position {
            OffsetPosition::Oldest => data.base,
            OffsetPosition::Newest => data.next_offset(),
        })
    }

    fn close(&self) -> Result<()> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Consumer for MemoryTopic {
    fn consume_partition(
        &self,
        topic: &str,
        partition: PartitionId,
        offset: Offset,
    ) -> Result<Box<dyn PartitionConsumer>> {
        let log = self.partition_log(topic, partition)?;
        {
            let data = log.data.lock();
            if offset < data.base || offset > data.next_offset() {
                return Err(VistaError::consume(
                    partition,
                    format!(
                        "offset {} out of range [{}, {}]",
                        offset,
                        data.base,
                        data.next_offset()
                    ),
                ));
            }
        }
        Ok(Box::new(MemoryPartitionConsumer {
            log,
            partition,
            next: offset,
        }))
    }
}

struct MemoryPartitionConsumer {
    log: Arc<PartitionLog>,
    partition: PartitionId,
    next: Offset,
}

#[async_trait]
impl PartitionConsumer for MemoryPartitionConsumer {
    async fn next_record(&mut self) -> Option<Result<Record>> {
        let log = Arc::clone(&self.log);
        loop {
            // Register before looking so an append between the check and the
            // await still wakes us.
            let notified = log.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let data = log.data.lock();
                if let Some(message) = &data.failure {
                    return Some(Err(VistaError::consume(self.partition, message)));
                }
                if self.next < data.base {
                    self.next = data.base;
                }
                let idx = (self.next - data.base) as usize;
                if let Some(record) = data.records.get(idx) {
                    self.next += 1;
                    return Some(Ok(record.clone()));
                }
                if data.ended {
                    return None;
                }
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_offsets_track_produce_and_truncate() {
        let log = MemoryTopic::new();
        log.create_topic("t", 1);
        for i in 0..5 {
            assert_eq!(log.produce_to("t", 0, "k", b"v").unwrap(), i);
        }
        assert_eq!(log.get_offset("t", 0, OffsetPosition::Oldest).unwrap(), 0);
        assert_eq!(log.get_offset("t", 0, OffsetPosition::Newest).unwrap(), 5);

        log.truncate("t", 0, 3).unwrap();
        assert_eq!(log.get_offset("t", 0, OffsetPosition::Oldest).unwrap(), 3);
        assert_eq!(log.get_offset("t", 0, OffsetPosition::Newest).unwrap(), 5);
    }

    #[test]
    fn test_unknown_topic() {
        let log = MemoryTopic::new();
        assert!(matches!(log.partitions("nope"), Err(VistaError::Config(_))));
        assert!(log.produce("nope", "k", b"v").is_err());
    }

    #[test]
    fn test_produce_routes_like_hash_key() {
        let log = MemoryTopic::new();
        log.create_topic("t", 4);
        let hasher = Murmur2Hasher::factory();
        for key in ["a", "b", "c", "foobar"] {
            let (partition, _) = log.produce("t", key, b"v").unwrap();
            assert_eq!(partition, hash_key(&hasher, key, 4).unwrap());
        }
    }

    #[tokio::test]
    async fn test_consumer_reads_then_tails() {
        let log = MemoryTopic::new();
        log.create_topic("t", 1);
        log.produce_to("t", 0, "a", b"1").unwrap();

        let mut consumer = log.consume_partition("t", 0, 0).unwrap();
        let first = consumer.next_record().await.unwrap().unwrap();
        assert_eq!((first.key.as_str(), first.offset), ("a", 0));

        let producer = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.produce_to("t", 0, "b", b"2").unwrap();
        });

        let second = tokio::time::timeout(Duration::from_secs(1), consumer.next_record())
            .await
            .expect("tailing consumer should wake on append")
            .unwrap()
            .unwrap();
        assert_eq!((second.key.as_str(), second.offset), ("b", 1));
    }

    #[tokio::test]
    async fn test_injected_failure_and_end() {
        let log = MemoryTopic::new();
        log.create_topic("t", 2);

        let mut failing = log.consume_partition("t", 0, 0).unwrap();
        log.fail_partition("t", 0, "broker gone").unwrap();
        assert!(matches!(
            failing.next_record().await,
            Some(Err(VistaError::Consume { partition: 0, .. }))
        ));

        log.produce_to("t", 1, "k", b"v").unwrap();
        log.end_partition("t", 1).unwrap();
        let mut ending = log.consume_partition("t", 1, 0).unwrap();
        assert!(ending.next_record().await.unwrap().is_ok());
        assert!(ending.next_record().await.is_none());
    }

    #[test]
    fn test_consume_out_of_range() {
        let log = MemoryTopic::new();
        log.create_topic("t", 1);
        log.produce_to("t", 0, "k", b"v").unwrap();
        assert!(log.consume_partition("t", 0, 1).is_ok());
        assert!(log.consume_partition("t", 0, 2).is_err());
    }
}
