//! Watch command implementation

use crate::setup::{RunningView, Setup};
use anyhow::{Context, Result};
use std::time::Duration;

pub async fn execute(setup: &Setup, interval_secs: u64) -> Result<()> {
    println!("Recovering view of {}...", setup.topic);
    let mut running = RunningView::start(setup.view()?).await?;
    println!("✓ View is running (Press Ctrl+C to stop)");

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for Ctrl+C")?;
                break;
            }
            res = running.finished() => {
                // The run loop ended by itself, which only happens on failure.
                return res;
            }
            _ = ticker.tick() => {
                for stats in running.view.stats() {
                    println!(
                        "partition {:>3}  {:<10}  last offset {:>10}  recovered {:>8}  tailed {:>8}",
                        stats.partition,
                        stats.state.as_str(),
                        stats.last_offset.map_or_else(|| "-".to_string(), |o| o.to_string()),
                        stats.recovered_records,
                        stats.running_records,
                    );
                }
            }
        }
    }

    println!("Stopping...");
    running.stop().await?;
    setup.log.sync().context("Failed to sync topic log")?;
    println!("✓ Stopped");
    Ok(())
}
