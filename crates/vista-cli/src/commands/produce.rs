//! Produce command implementation

use crate::setup::Setup;
use anyhow::{Context, Result};

pub fn execute(setup: &Setup, key: &str, value: &[u8], partition: Option<i32>) -> Result<()> {
    let (partition, offset) = match partition {
        Some(partition) => {
            let offset = setup
                .log
                .produce_to(&setup.topic, partition, key, value)
                .with_context(|| format!("Failed to produce to partition {}", partition))?;
            (partition, offset)
        }
        None => setup
            .log
            .produce(&setup.topic, key, value)
            .context("Failed to produce record")?,
    };
    setup.log.sync().context("Failed to sync topic log")?;

    let kind = if value.is_empty() { "tombstone" } else { "record" };
    println!(
        "✓ Wrote {} for {:?} to {}/{} at offset {}",
        kind, key, setup.topic, partition, offset
    );
    Ok(())
}
