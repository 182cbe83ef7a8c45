//! Partitioned materialized view over one topic
//!
//! A [`View`] owns one [`PartitionTable`] per partition of its topic.
//! [`View::run`] recovers and tails every partition concurrently; reads are
//! routed by key hash to the owning partition and served from local storage
//! whether or not that partition has caught up yet.
//!
//! # Example
//!
//! ```no_run
//! use vista::prelude::*;
//! use vista::tester::MemoryTopic;
//!
//! # async fn example() -> Result<()> {
//! let log = MemoryTopic::new();
//! log.create_topic("balances", 4);
//! log.produce("balances", "alice", b"10")?;
//!
//! let view = Arc::new(View::new(
//!     "balances",
//!     ViewOptions::new(Int64Codec)
//!         .with_topic_manager_builder(log.topic_manager_builder())
//!         .with_consumer_builder(log.consumer_builder()),
//! )?);
//!
//! let token = CancellationToken::new();
//! let runner = tokio::spawn({
//!     let view = Arc::clone(&view);
//!     let token = token.clone();
//!     async move { view.run(token).await }
//! });
//!
//! let _ = view.wait_running().await;
//! assert_eq!(view.get("alice")?, Some(10));
//!
//! token.cancel();
//! runner
//!     .await
//!     .map_err(|e| VistaError::Task(e.to_string()))??;
//! # Ok(())
//! # }
//! ```

use crate::options::ViewOptions;
use crate::partition_table::{PartitionState, PartitionStats, PartitionTable};
use crate::proxy::StorageProxy;
use crate::signal::{Signal, StateWaiter};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vista_core::{
    hash_key, observe, Codec, Errors, PartitionId, Result, TopicManager, VistaError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViewState {
    Idle,
    CatchUp,
    Running,
}

impl ViewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewState::Idle => "idle",
            ViewState::CatchUp => "catch_up",
            ViewState::Running => "running",
        }
    }
}

pub struct View<C: Codec> {
    topic: String,
    partitions: RwLock<Vec<Arc<PartitionTable>>>,
    options: ViewOptions<C>,
    state: Signal<ViewState>,
    terminated: AtomicBool,
    tmgr: Mutex<Option<Arc<dyn TopicManager>>>,
    /// Token of the `run` call in progress, if any
    active: Mutex<Option<CancellationToken>>,
}

impl<C: Codec> View<C> {
    /// Build a view over `topic` with one partition table per partition.
    ///
    /// # Errors
    ///
    /// `Config` when a transport builder is missing or partition discovery
    /// fails; any error of the storage builder. Everything acquired up to
    /// the failure is released before returning.
    pub fn new(topic: impl Into<String>, options: ViewOptions<C>) -> Result<Self> {
        let topic = topic.into();
        let (tmgr_builder, consumer_builder) = options.transport_builders()?;
        let brokers = options.config.brokers.as_slice();

        let tmgr = tmgr_builder(brokers)
            .map_err(|e| VistaError::Config(format!("creating topic manager: {}", e)))?;

        let count = match tmgr.partitions(&topic).and_then(|ids| dense_partition_count(&topic, ids)) {
            Ok(count) => count,
            Err(e) => {
                release(&[], tmgr.as_ref());
                return Err(match e {
                    e @ VistaError::Config(_) => e,
                    other => VistaError::Config(format!(
                        "listing partitions of {:?}: {}",
                        topic, other
                    )),
                });
            }
        };

        let consumer = match consumer_builder(brokers, &options.config.client_id) {
            Ok(consumer) => consumer,
            Err(e) => {
                release(&[], tmgr.as_ref());
                return Err(VistaError::Config(format!("creating consumer: {}", e)));
            }
        };

        let mut partitions = Vec::with_capacity(count);
        for partition in 0..count as PartitionId {
            let storage = match (options.storage_builder)(&topic, partition) {
                Ok(storage) => storage,
                Err(e) => {
                    release(&partitions, tmgr.as_ref());
                    return Err(e);
                }
            };
            partitions.push(Arc::new(PartitionTable::new(
                topic.clone(),
                partition,
                StorageProxy::new(storage, partition, Arc::clone(&options.update)),
                Arc::clone(&consumer),
                Arc::clone(&tmgr),
            )));
        }

        debug!(topic = %topic, partitions = count, codec = options.codec.name(), "view created");

        Ok(Self {
            topic,
            partitions: RwLock::new(partitions),
            options,
            state: Signal::new(
                ViewState::Idle,
                [ViewState::Idle, ViewState::CatchUp, ViewState::Running],
            ),
            terminated: AtomicBool::new(false),
            tmgr: Mutex::new(Some(tmgr)),
            active: Mutex::new(None),
        })
    }

    /// Recover and tail every partition until `token` is cancelled or a
    /// partition fails.
    ///
    /// The view goes `CatchUp` on entry and `Running` once every partition
    /// has recovered. The first partition failure cancels the others; all
    /// failures are returned together. On return the view is `Idle` again
    /// and, unless it is restartable, its partitions are closed.
    ///
    /// Only one `run` may be active per view; a second call fails with
    /// `InvalidState`.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        let child = token.child_token();
        {
            // `terminate` flips the flag under this lock too.
            let mut active = self.active.lock();
            if self.is_terminated() {
                return Err(VistaError::Config(format!(
                    "view {:?} has been terminated",
                    self.topic
                )));
            }
            if active.is_some() {
                return Err(VistaError::InvalidState(format!(
                    "view {:?} is already running",
                    self.topic
                )));
            }
            *active = Some(child.clone());
        }
        let claim = ActiveRun(&self.active);

        let partitions = self.partitions.read().clone();
        if partitions.is_empty() {
            return Err(VistaError::Config(format!(
                "view {:?} has no partitions",
                self.topic
            )));
        }

        self.enter_catch_up(&partitions)?;
        info!(topic = %self.topic, partitions = partitions.len(), "starting view");

        let mut tasks = JoinSet::new();
        for pt in &partitions {
            let pt = Arc::clone(pt);
            let token = child.clone();
            tasks.spawn(async move { pt.run(token).await });
        }

        let watcher = {
            let waiters: Vec<StateWaiter> = partitions.iter().map(|pt| pt.wait_running()).collect();
            let state = self.state.clone();
            let topic = self.topic.clone();
            tokio::spawn(async move {
                for waiter in waiters {
                    if waiter.await.is_err() {
                        return;
                    }
                }
                if state.set_state(ViewState::Running).is_ok() {
                    observe::record_view_state(&topic, ViewState::Running.as_str());
                    info!(topic = %topic, "view running");
                }
            })
        };

        let mut errs = Errors::new();
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(VistaError::Task(e.to_string())));
            if let Err(e) = result {
                if errs.is_empty() {
                    error!(topic = %self.topic, error = %e, "partition failed, stopping view");
                    child.cancel();
                }
                errs.push(e);
            }
        }

        watcher.abort();
        let _ = watcher.await;
        drop(claim);

        // A terminate that arrived while partitions were still applying
        // leaves the close to us.
        if !self.is_restartable() || self.is_terminated() {
            errs.merge(self.close());
        }
        self.transition(ViewState::Idle)?;
        info!(topic = %self.topic, errors = errs.len(), "view stopped");
        errs.into_result()
    }

    fn enter_catch_up(&self, partitions: &[Arc<PartitionTable>]) -> Result<()> {
        for pt in partitions {
            pt.signal().set_state(PartitionState::Recovering)?;
        }
        self.transition(ViewState::CatchUp)
    }

    fn transition(&self, state: ViewState) -> Result<()> {
        self.state.set_state(state)?;
        observe::record_view_state(&self.topic, state.as_str());
        Ok(())
    }

    /// Notification that fires once the view is `Running`
    pub fn wait_running(&self) -> StateWaiter {
        self.state.wait_for_state(ViewState::Running)
    }

    pub fn current_state(&self) -> ViewState {
        self.state.state()
    }

    /// Whether every partition has caught up. False without partitions.
    pub fn recovered(&self) -> bool {
        let partitions = self.partitions.read();
        !partitions.is_empty() && partitions.iter().all(|pt| pt.is_running())
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }

    pub fn is_restartable(&self) -> bool {
        self.options.config.restartable
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn codec(&self) -> &C {
        &self.options.codec
    }

    /// Partition `key` is routed to
    pub fn hash(&self, key: &str) -> Result<PartitionId> {
        hash_key(&self.options.hasher, key, self.partitions.read().len())
    }

    /// Storage proxy of the partition `key` is routed to
    pub fn find(&self, key: &str) -> Result<StorageProxy> {
        let partitions = self.partitions.read();
        let idx = hash_key(&self.options.hasher, key, partitions.len())?;
        partitions
            .get(idx as usize)
            .map(|pt| pt.proxy().clone())
            .ok_or_else(|| VistaError::Config(format!("no partition {} in view", idx)))
    }

    /// Decoded value of `key`, `None` when the key is absent
    pub fn get(&self, key: &str) -> Result<Option<C::Value>> {
        let proxy = self.find(key)?;
        match proxy.get(key)? {
            Some(bytes) => Ok(Some(self.options.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        self.find(key)?.has(key)
    }

    /// Remove `key` from local storage only. The log is not touched; the
    /// key comes back if a newer record for it is consumed.
    pub fn evict(&self, key: &str) -> Result<()> {
        self.find(key)?.delete(key)
    }

    pub fn stats(&self) -> Vec<PartitionStats> {
        self.partitions.read().iter().map(|pt| pt.stats()).collect()
    }

    /// Every `(key, value)` of the view, partition by partition
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<(String, C::Value)>> + '_> {
        let proxies: Vec<StorageProxy> = self
            .partitions
            .read()
            .iter()
            .map(|pt| pt.proxy().clone())
            .collect();

        let mut iters = Vec::with_capacity(proxies.len());
        for proxy in &proxies {
            iters.push(proxy.iter()?);
        }

        let codec = &self.options.codec;
        Ok(iters.into_iter().flatten().map(move |item| {
            let (key, raw) = item?;
            Ok((key, codec.decode(&raw)?))
        }))
    }

    /// Close every partition and the topic manager, then drop the partitions.
    ///
    /// All close failures are collected. The partitions are gone afterwards
    /// regardless, so a second call does nothing.
    pub(crate) fn close(&self) -> Errors {
        let partitions = std::mem::take(&mut *self.partitions.write());
        let mut errs = Errors::new();
        for pt in &partitions {
            if let Err(e) = pt.close() {
                warn!(topic = %self.topic, partition = pt.partition(), error = %e, "closing partition failed");
                errs.push(e);
            }
        }
        if let Some(tmgr) = self.tmgr.lock().take() {
            if let Err(e) = tmgr.close() {
                warn!(topic = %self.topic, error = %e, "closing topic manager failed");
                errs.push(e);
            }
        }
        errs
    }

    /// Tear the view down, if it is restartable.
    ///
    /// A restartable view is marked terminated and its partitions are
    /// closed; later calls return `Ok(())`. With a `run` in progress, the
    /// run is cancelled and closes the partitions itself once every
    /// partition task has stopped, so close failures surface from `run`.
    /// For a view that is not restartable this does nothing: cancel the
    /// token given to `run` instead.
    pub fn terminate(&self) -> Result<()> {
        if !self.is_restartable() {
            debug!(topic = %self.topic, "terminate ignored for non-restartable view");
            return Ok(());
        }

        let active = self.active.lock();
        if self.terminated.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(topic = %self.topic, "terminating view");
        if let Some(token) = active.as_ref() {
            token.cancel();
            return Ok(());
        }
        drop(active);
        self.close().into_result()
    }
}

/// Clears the active-run slot when `run` returns or its future is dropped
struct ActiveRun<'a>(&'a Mutex<Option<CancellationToken>>);

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

/// Number of partitions, provided the ids are exactly `0..n` with `n > 0`
fn dense_partition_count(topic: &str, mut ids: Vec<PartitionId>) -> Result<usize> {
    ids.sort_unstable();
    let dense = ids
        .iter()
        .enumerate()
        .all(|(idx, id)| usize::try_from(*id).map_or(false, |id| id == idx));
    if ids.is_empty() || !dense {
        return Err(VistaError::Config(format!(
            "topic {:?} has no usable partitions: {:?}",
            topic, ids
        )));
    }
    Ok(ids.len())
}

fn release(partitions: &[Arc<PartitionTable>], tmgr: &dyn TopicManager) {
    for pt in partitions {
        if let Err(e) = pt.close() {
            warn!(partition = pt.partition(), error = %e, "closing partition failed");
        }
    }
    if let Err(e) = tmgr.close() {
        warn!(error = %e, "closing topic manager failed");
    }
}
