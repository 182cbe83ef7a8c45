//! Optional metrics instrumentation for vista.
//!
//! When the `observe` feature is enabled, partition and view lifecycle events
//! emit counters and gauges via the [`metrics`] crate. A downstream
//! application must install a metrics recorder to collect them.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

use crate::types::{Offset, PartitionId};

/// Record one applied record.
///
/// - `vista.partition.records_applied_total` – counter with `topic`, `partition`
///   and `phase` (`recovering` / `running`) labels
#[inline]
pub fn record_applied(topic: &str, partition: PartitionId, recovering: bool) {
    #[cfg(feature = "observe")]
    {
        let phase = if recovering { "recovering" } else { "running" };
        metrics::counter!(
            "vista.partition.records_applied_total",
            "topic" => topic.to_string(),
            "partition" => partition.to_string(),
            "phase" => phase
        )
        .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (topic, partition, recovering);
    }
}

/// Record how far a partition is behind the high-water mark it is recovering to.
///
/// - `vista.partition.recovery_lag` – gauge
#[inline]
pub fn set_recovery_lag(topic: &str, partition: PartitionId, hwm: Offset, next: Offset) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!(
            "vista.partition.recovery_lag",
            "topic" => topic.to_string(),
            "partition" => partition.to_string()
        )
        .set((hwm - next).max(0) as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (topic, partition, hwm, next);
    }
}

/// Record a completed recovery pass.
///
/// - `vista.partition.recoveries_total` – counter
/// - `vista.partition.recovery_duration_seconds` – histogram
#[inline]
pub fn record_recovered(topic: &str, partition: PartitionId, duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!(
            "vista.partition.recoveries_total",
            "topic" => topic.to_string(),
            "partition" => partition.to_string()
        )
        .increment(1);
        metrics::histogram!("vista.partition.recovery_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (topic, partition, duration);
    }
}

/// Record a view state transition.
///
/// - `vista.view.state_changes_total` – counter with `topic` and `state` labels
#[inline]
pub fn record_view_state(topic: &str, state: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!(
            "vista.view.state_changes_total",
            "topic" => topic.to_string(),
            "state" => state
        )
        .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (topic, state);
    }
}
