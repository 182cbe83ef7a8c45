//! File-backed partitioned topic log
//!
//! An append-only log with one file per partition, usable as both the log
//! transport and the partition/offset discovery of a vista view.
//!
//! Features:
//! - Sequential appends with optional flush per record
//! - Producer API routing keys with the same hasher as the view
//! - Tailing consumers woken in-process on append, polling otherwise
//! - Crash tolerance: partial trailing records are dropped on open

mod consumer;
mod format;
mod store;

pub use store::FileTopicLog;
pub use vista_core::FileLogConfig;
