//! Views persisted in LMDB survive a restart and resume from their bookmark.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use vista::prelude::*;
use vista::tester::MemoryTopic;
use vista_lmdb::{LmdbStorage, LmdbStorageConfig};

const TOPIC: &str = "balances";
const WAIT: Duration = Duration::from_secs(5);

fn config(dir: &TempDir) -> LmdbStorageConfig {
    LmdbStorageConfig::new(dir.path()).with_map_size(16 * 1024 * 1024)
}

fn counting_view(
    log: &MemoryTopic,
    dir: &TempDir,
    counter: &Arc<AtomicUsize>,
) -> Arc<View<Int64Codec>> {
    let counter = Arc::clone(counter);
    let update: UpdateCallback = Arc::new(
        move |st: &dyn Storage, partition: PartitionId, key: &str, value: &[u8]| -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            default_update(st, partition, key, value)
        },
    );
    let options = ViewOptions::new(Int64Codec)
        .with_storage_builder(LmdbStorage::builder(config(dir)))
        .with_topic_manager_builder(log.topic_manager_builder())
        .with_consumer_builder(log.consumer_builder())
        .with_update(update);
    Arc::new(View::new(TOPIC, options).unwrap())
}

async fn run_until_running(
    view: &Arc<View<Int64Codec>>,
) -> (CancellationToken, tokio::task::JoinHandle<Result<()>>) {
    let running = view.wait_running();
    let token = CancellationToken::new();
    let handle = tokio::spawn({
        let view = Arc::clone(view);
        let token = token.clone();
        async move { view.run(token).await }
    });
    tokio::time::timeout(WAIT, running)
        .await
        .expect("view should reach running")
        .unwrap();
    (token, handle)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_resumes_from_persisted_bookmark() {
    let dir = TempDir::new().unwrap();
    let log = MemoryTopic::new();
    log.create_topic(TOPIC, 2);
    for i in 0..8 {
        log.produce(TOPIC, &format!("acct-{}", i), b"100").unwrap();
    }

    let first = Arc::new(AtomicUsize::new(0));
    let view = counting_view(&log, &dir, &first);
    let (token, handle) = run_until_running(&view).await;
    assert_eq!(first.load(Ordering::SeqCst), 8);
    token.cancel();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
    // Not restartable: run closed every storage, releasing the environments.
    drop(view);

    log.produce(TOPIC, "acct-0", b"250").unwrap();
    log.produce(TOPIC, "acct-3", b"").unwrap();

    let second = Arc::new(AtomicUsize::new(0));
    let view = counting_view(&log, &dir, &second);
    let (token, handle) = run_until_running(&view).await;
    assert_eq!(second.load(Ordering::SeqCst), 2);
    assert_eq!(view.get("acct-0").unwrap(), Some(250));
    assert_eq!(view.get("acct-1").unwrap(), Some(100));
    assert!(!view.has("acct-3").unwrap());
    assert_eq!(view.iter().unwrap().count(), 7);

    token.cancel();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bookmarks_match_log_after_recovery() {
    let dir = TempDir::new().unwrap();
    let log = MemoryTopic::new();
    log.create_topic(TOPIC, 3);
    for i in 0..12 {
        log.produce(TOPIC, &format!("k{}", i), b"1").unwrap();
    }

    let counter = Arc::new(AtomicUsize::new(0));
    let view = counting_view(&log, &dir, &counter);
    let (token, handle) = run_until_running(&view).await;

    for stats in view.stats() {
        let hwm = log
            .get_offset(TOPIC, stats.partition, OffsetPosition::Newest)
            .unwrap();
        let expected = if hwm > 0 { Some(hwm - 1) } else { None };
        assert_eq!(stats.last_offset, expected);
        assert_eq!(stats.state, PartitionState::Running);
    }

    token.cancel();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
    drop(view);

    // Bookmarks and the recovery timestamp are on disk.
    let cfg = config(&dir);
    for partition in 0..3 {
        let storage = LmdbStorage::open(&cfg, TOPIC, partition).unwrap();
        let hwm = log.get_offset(TOPIC, partition, OffsetPosition::Newest).unwrap();
        let expected = if hwm > 0 { Some(hwm - 1) } else { None };
        assert_eq!(storage.get_offset().unwrap(), expected);
        assert!(storage.recovered_at().unwrap().is_some());
    }
}
