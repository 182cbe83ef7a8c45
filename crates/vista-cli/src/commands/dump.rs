//! Dump command implementation

use crate::setup::{display_value, RunningView, Setup};
use anyhow::{Context, Result};

pub async fn execute(setup: &Setup, json: bool) -> Result<()> {
    let running = RunningView::start(setup.view()?).await?;

    let mut count = 0usize;
    for entry in running.view.iter().context("Failed to iterate view")? {
        let (key, value) = entry.context("Failed to read entry")?;
        if json {
            let line = serde_json::json!({ "key": key, "value": display_value(&value) });
            println!("{}", line);
        } else {
            println!("{}\t{}", key, display_value(&value));
        }
        count += 1;
    }
    running.stop().await?;

    tracing::info!(topic = %setup.topic, keys = count, "dumped view");
    Ok(())
}
