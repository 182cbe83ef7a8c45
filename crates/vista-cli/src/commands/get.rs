//! Get command implementation

use crate::setup::{display_value, RunningView, Setup};
use anyhow::{bail, Context, Result};

pub async fn execute(setup: &Setup, key: &str) -> Result<()> {
    let running = RunningView::start(setup.view()?).await?;
    let partition = running.view.hash(key).context("Failed to route key")?;
    let value = running.view.get(key).context("Failed to read key")?;
    running.stop().await?;

    match value {
        Some(value) => println!("{}", display_value(&value)),
        None => bail!("{:?} not found in {}/{}", key, setup.topic, partition),
    }
    Ok(())
}
