//! Recovery and tailing of a single partition
//!
//! A partition task snapshots the log bounds once, resumes from the local
//! bookmark, applies records through its [`StorageProxy`] until it reaches
//! the high-water mark of that snapshot, then switches to `Running` and
//! keeps tailing until cancelled.

use crate::proxy::StorageProxy;
use crate::signal::{Signal, StateWaiter};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use vista_core::{
    observe, Consumer, Offset, OffsetPosition, PartitionId, Result, TopicManager, VistaError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PartitionState {
    Recovering,
    Running,
}

impl PartitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionState::Recovering => "recovering",
            PartitionState::Running => "running",
        }
    }
}

/// Point-in-time progress of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionStats {
    pub partition: PartitionId,
    pub state: PartitionState,
    /// High-water mark captured at the start of the last recovery pass
    pub hwm: Option<Offset>,
    /// Offset of the last record applied by this process
    pub last_offset: Option<Offset>,
    pub recovered_records: u64,
    pub running_records: u64,
}

#[derive(Debug, Default)]
struct Progress {
    hwm: Option<Offset>,
    last_offset: Option<Offset>,
    recovered_records: u64,
    running_records: u64,
}

pub struct PartitionTable {
    topic: String,
    partition: PartitionId,
    st: StorageProxy,
    state: Signal<PartitionState>,
    consumer: Arc<dyn Consumer>,
    tmgr: Arc<dyn TopicManager>,
    progress: Mutex<Progress>,
}

impl PartitionTable {
    pub fn new(
        topic: impl Into<String>,
        partition: PartitionId,
        st: StorageProxy,
        consumer: Arc<dyn Consumer>,
        tmgr: Arc<dyn TopicManager>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            st,
            state: Signal::new(
                PartitionState::Recovering,
                [PartitionState::Recovering, PartitionState::Running],
            ),
            consumer,
            tmgr,
            progress: Mutex::new(Progress::default()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn proxy(&self) -> &StorageProxy {
        &self.st
    }

    pub fn state(&self) -> PartitionState {
        self.state.state()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_state(PartitionState::Running)
    }

    pub fn wait_running(&self) -> StateWaiter {
        self.state.wait_for_state(PartitionState::Running)
    }

    pub(crate) fn signal(&self) -> &Signal<PartitionState> {
        &self.state
    }

    pub fn stats(&self) -> PartitionStats {
        let progress = self.progress.lock();
        PartitionStats {
            partition: self.partition,
            state: self.state(),
            hwm: progress.hwm,
            last_offset: progress.last_offset,
            recovered_records: progress.recovered_records,
            running_records: progress.running_records,
        }
    }

    /// Recover, then tail until `token` is cancelled or the log fails.
    ///
    /// Returns `Ok(())` on cancellation or when the log stream ends after
    /// recovery. A stream that ends while still recovering is a `Consume`
    /// error, since the partition could never become `Running`.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        let span = tracing::info_span!("partition", topic = %self.topic, partition = self.partition);
        self.run_inner(token).instrument(span).await
    }

    async fn run_inner(&self, token: CancellationToken) -> Result<()> {
        self.state.set_state(PartitionState::Recovering)?;

        let oldest = self
            .tmgr
            .get_offset(&self.topic, self.partition, OffsetPosition::Oldest)?;
        let hwm = self
            .tmgr
            .get_offset(&self.topic, self.partition, OffsetPosition::Newest)?;
        let local = self.st.get_offset()?;
        let start = resume_offset(local, oldest, hwm)?;

        {
            let mut progress = self.progress.lock();
            progress.hwm = Some(hwm);
            progress.recovered_records = 0;
        }

        let started = Instant::now();
        if start >= hwm {
            self.mark_running(started)?;
        } else {
            info!(start, hwm, "recovering partition");
            observe::set_recovery_lag(&self.topic, self.partition, hwm, start);
        }

        let mut stream = self
            .consumer
            .consume_partition(&self.topic, self.partition, start)?;

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("partition stopped");
                    return Ok(());
                }
                next = stream.next_record() => next,
            };

            let record = match next {
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    error!(error = %e, "consuming partition failed");
                    return Err(match e {
                        e @ VistaError::Consume { .. } => e,
                        other => VistaError::consume(self.partition, other),
                    });
                }
                None if self.is_running() => {
                    debug!("partition stream ended");
                    return Ok(());
                }
                None => {
                    warn!(hwm, "partition stream ended before recovery finished");
                    return Err(VistaError::consume(
                        self.partition,
                        format!("stream ended before reaching high-water mark {}", hwm),
                    ));
                }
            };

            let recovering = !self.is_running();
            self.st.update(&record.key, &record.value)?;
            self.st.set_offset(record.offset)?;
            self.applied(record.offset, recovering);

            if recovering {
                let next_offset = record.offset + 1;
                observe::set_recovery_lag(&self.topic, self.partition, hwm, next_offset);
                if next_offset >= hwm {
                    self.mark_running(started)?;
                }
            }
        }
    }

    fn applied(&self, offset: Offset, recovering: bool) {
        let mut progress = self.progress.lock();
        progress.last_offset = Some(offset);
        if recovering {
            progress.recovered_records += 1;
        } else {
            progress.running_records += 1;
        }
        observe::record_applied(&self.topic, self.partition, recovering);
    }

    fn mark_running(&self, started: Instant) -> Result<()> {
        self.st.mark_recovered()?;
        self.state.set_state(PartitionState::Running)?;

        let elapsed = started.elapsed();
        observe::record_recovered(&self.topic, self.partition, elapsed);
        info!(
            recovered = self.progress.lock().recovered_records,
            elapsed_ms = elapsed.as_millis() as u64,
            "partition recovered"
        );
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.st.close()
    }
}

/// First offset to consume, given the local bookmark and the log bounds.
///
/// The bookmark is the offset of the last applied record, so consumption
/// resumes right after it.
fn resume_offset(local: Option<Offset>, oldest: Offset, hwm: Offset) -> Result<Offset> {
    let start = match local {
        Some(bookmark) => bookmark + 1,
        None => oldest,
    };

    if start < oldest {
        warn!(
            start,
            oldest, "local offset is behind the oldest available record; skipping truncated range"
        );
        return Ok(oldest);
    }
    if start > hwm {
        return Err(VistaError::InvalidState(format!(
            "local offset {} is ahead of the log (high-water mark {})",
            start - 1,
            hwm
        )));
    }
    Ok(start)
}
