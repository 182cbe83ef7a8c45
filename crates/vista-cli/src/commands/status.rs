//! Status command implementation

use crate::setup::Setup;
use crate::StorageKind;
use anyhow::{Context, Result};
use vista::prelude::*;
use vista_lmdb::LmdbStorage;

pub fn execute(setup: &Setup) -> Result<()> {
    tracing::info!("Checking view status: {}", setup.topic);

    let partitions = setup
        .log
        .partitions(&setup.topic)
        .context("Failed to list partitions")?;

    println!("\nView Status");
    println!("{}", "=".repeat(60));
    println!("Topic: {}", setup.topic);
    println!("Log: {}", setup.log.config().base_dir.display());
    println!("Partitions: {}", partitions.len());

    if setup.storage == StorageKind::Memory {
        println!("\nStorage is in memory; no local bookmarks to report.");
    } else {
        println!("State: {}", setup.lmdb_config.base_dir.display());
    }

    println!(
        "\n{:>9}  {:>10}  {:>10}  {:>10}  {:>8}  {}",
        "partition", "oldest", "newest", "bookmark", "lag", "recovered at"
    );

    let mut behind = 0i64;
    for partition in partitions {
        let oldest = setup
            .log
            .get_offset(&setup.topic, partition, OffsetPosition::Oldest)
            .context("Failed to read oldest offset")?;
        let newest = setup
            .log
            .get_offset(&setup.topic, partition, OffsetPosition::Newest)
            .context("Failed to read newest offset")?;

        let (bookmark, recovered_at) = match setup.storage {
            StorageKind::Lmdb => local_bookmark(setup, partition)?,
            StorageKind::Memory => (None, None),
        };
        // Records in [resume point, newest) still have to be applied.
        let resume = bookmark.map(|b| b + 1).unwrap_or(oldest).max(oldest);
        let lag = (newest - resume).max(0);
        behind += lag;

        println!(
            "{:>9}  {:>10}  {:>10}  {:>10}  {:>8}  {}",
            partition,
            oldest,
            newest,
            bookmark.map_or_else(|| "-".to_string(), |b| b.to_string()),
            lag,
            recovered_at.unwrap_or_else(|| "-".to_string()),
        );
    }

    if setup.storage == StorageKind::Lmdb {
        if behind > 0 {
            println!("\n⚠️  View lag: {} record(s) behind", behind);
            println!("Run 'vista watch' to catch up");
        } else {
            println!("\n✓ View is up to date");
        }
    }

    Ok(())
}

/// Bookmark and last recovery time of one partition, without creating
/// storage that does not exist yet
fn local_bookmark(
    setup: &Setup,
    partition: PartitionId,
) -> Result<(Option<Offset>, Option<String>)> {
    let path =
        LmdbStorage::partition_path(&setup.lmdb_config.base_dir, &setup.topic, partition);
    if !path.exists() {
        return Ok((None, None));
    }

    let storage = LmdbStorage::open(&setup.lmdb_config, &setup.topic, partition)
        .with_context(|| format!("Failed to open storage {}", path.display()))?;
    let bookmark = storage.get_offset().context("Failed to read bookmark")?;
    let recovered_at = storage
        .recovered_at()
        .context("Failed to read recovery time")?
        .map(|ts| ts.to_rfc3339());
    storage.close().context("Failed to close storage")?;
    Ok((bookmark, recovered_at))
}
