//! Tailing consumers and views over the file-backed log.

use std::time::Duration;
use tempfile::TempDir;
use vista::prelude::*;
use vista::{ConsumerBuilder, TopicManagerBuilder};
use vista_file_log::{FileLogConfig, FileTopicLog};

const TOPIC: &str = "accounts";
const WAIT: Duration = Duration::from_secs(5);

fn open(dir: &TempDir, partitions: u32) -> Arc<FileTopicLog> {
    let config = FileLogConfig::new(dir.path())
        .with_partitions(partitions)
        .with_poll_interval_ms(10);
    let log = Arc::new(FileTopicLog::open(config).unwrap());
    log.create_topic(TOPIC).unwrap();
    log
}

fn builders(log: &Arc<FileTopicLog>) -> (TopicManagerBuilder, ConsumerBuilder) {
    let tmgr = Arc::clone(log);
    let consumer = Arc::clone(log);
    (
        Arc::new(move |_brokers: &[String]| -> Result<Arc<dyn TopicManager>> {
            Ok(Arc::clone(&tmgr) as Arc<dyn TopicManager>)
        }),
        Arc::new(
            move |_brokers: &[String], _client_id: &str| -> Result<Arc<dyn Consumer>> {
                Ok(Arc::clone(&consumer) as Arc<dyn Consumer>)
            },
        ),
    )
}

fn string_view(log: &Arc<FileTopicLog>) -> Arc<View<StringCodec>> {
    let (tmgr, consumer) = builders(log);
    Arc::new(
        View::new(
            TOPIC,
            ViewOptions::new(StringCodec)
                .with_topic_manager_builder(tmgr)
                .with_consumer_builder(consumer),
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_consumer_reads_from_offset_then_tails() {
    let dir = TempDir::new().unwrap();
    let log = open(&dir, 1);
    for i in 0..3 {
        log.produce_to(TOPIC, 0, &format!("k{}", i), b"v").unwrap();
    }

    let mut consumer = log.consume_partition(TOPIC, 0, 1).unwrap();
    let first = consumer.next_record().await.unwrap().unwrap();
    assert_eq!((first.key.as_str(), first.offset), ("k1", 1));
    assert!(first.timestamp.is_some());
    let second = consumer.next_record().await.unwrap().unwrap();
    assert_eq!(second.offset, 2);

    let producer = Arc::clone(&log);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.produce_to(TOPIC, 0, "k3", b"").unwrap();
    });

    let tailed = tokio::time::timeout(WAIT, consumer.next_record())
        .await
        .expect("append should wake the consumer")
        .unwrap()
        .unwrap();
    assert_eq!(tailed.offset, 3);
    assert!(tailed.is_tombstone());
}

#[tokio::test]
async fn test_consumer_polls_appends_from_another_writer() {
    let dir = TempDir::new().unwrap();
    let reader = open(&dir, 1);
    let mut consumer = reader.consume_partition(TOPIC, 0, 0).unwrap();

    // A second handle on the same directory stands in for another process.
    let writer = open(&dir, 1);
    writer.produce_to(TOPIC, 0, "remote", b"1").unwrap();

    let record = tokio::time::timeout(WAIT, consumer.next_record())
        .await
        .expect("polling should pick up the record")
        .unwrap()
        .unwrap();
    assert_eq!(record.key, "remote");
}

#[tokio::test]
async fn test_consume_below_oldest_fails() {
    let dir = TempDir::new().unwrap();
    let log = open(&dir, 1);
    assert!(log.consume_partition(TOPIC, 0, -1).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_view_materializes_file_log() {
    let dir = TempDir::new().unwrap();
    let log = open(&dir, 3);
    log.produce(TOPIC, "alice", b"admin").unwrap();
    log.produce(TOPIC, "bob", b"viewer").unwrap();
    log.produce(TOPIC, "carol", b"viewer").unwrap();
    log.produce(TOPIC, "bob", b"").unwrap();

    let view = string_view(&log);
    let token = CancellationToken::new();
    let handle = tokio::spawn({
        let view = Arc::clone(&view);
        let token = token.clone();
        async move { view.run(token).await }
    });

    tokio::time::timeout(WAIT, view.wait_running())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.get("alice").unwrap().as_deref(), Some("admin"));
    assert_eq!(view.get("bob").unwrap(), None);
    assert!(view.has("carol").unwrap());

    log.produce(TOPIC, "dave", b"editor").unwrap();
    tokio::time::timeout(WAIT, async {
        while view.get("dave").unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("tailed record should show up");

    token.cancel();
    tokio::time::timeout(WAIT, handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_view_after_reopen_sees_everything() {
    let dir = TempDir::new().unwrap();
    {
        let log = open(&dir, 2);
        for i in 0..20 {
            log.produce(TOPIC, &format!("user-{}", i), b"x").unwrap();
        }
    }

    let log = open(&dir, 2);
    let view = string_view(&log);
    let token = CancellationToken::new();
    let handle = tokio::spawn({
        let view = Arc::clone(&view);
        let token = token.clone();
        async move { view.run(token).await }
    });

    tokio::time::timeout(WAIT, view.wait_running())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.iter().unwrap().count(), 20);
    let applied: u64 = view.stats().iter().map(|s| s.recovered_records).sum();
    assert_eq!(applied, 20);

    token.cancel();
    tokio::time::timeout(WAIT, handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_view_over_buffered_log_recovers_then_tails_on_sync() {
    let dir = TempDir::new().unwrap();
    let config = FileLogConfig::new(dir.path())
        .with_partitions(1)
        .with_poll_interval_ms(10)
        .with_flush_on_append(false);
    let log = Arc::new(FileTopicLog::open(config).unwrap());
    log.create_topic(TOPIC).unwrap();
    log.produce(TOPIC, "alice", b"admin").unwrap();

    let view = string_view(&log);
    let token = CancellationToken::new();
    let handle = tokio::spawn({
        let view = Arc::clone(&view);
        let token = token.clone();
        async move { view.run(token).await }
    });

    // The buffered record is not part of the high-water mark.
    tokio::time::timeout(WAIT, view.wait_running())
        .await
        .expect("view should not wait on buffered records")
        .unwrap();

    log.sync().unwrap();
    tokio::time::timeout(WAIT, async {
        while view.get("alice").unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("synced record should be tailed");

    token.cancel();
    tokio::time::timeout(WAIT, handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
