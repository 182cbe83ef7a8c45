use crate::format;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use vista_core::{Offset, PartitionConsumer, PartitionId, Record, Result, VistaError};

/// Tailing reader over one partition file
///
/// Keeps the byte position of the next unread record. A read that hits the
/// end of the file mid-record leaves the position untouched and waits, so a
/// record still being written is picked up whole on a later attempt.
pub(crate) struct FilePartitionConsumer {
    topic: String,
    partition: PartitionId,
    path: PathBuf,
    file: Option<File>,
    pos: u64,
    start: Offset,
    notify: Arc<Notify>,
    poll_interval: Duration,
    max_record_size: usize,
}

impl FilePartitionConsumer {
    pub(crate) fn new(
        topic: String,
        partition: PartitionId,
        path: PathBuf,
        start: Offset,
        notify: Arc<Notify>,
        poll_interval: Duration,
        max_record_size: usize,
    ) -> Self {
        Self {
            topic,
            partition,
            path,
            file: None,
            pos: 0,
            start,
            notify,
            poll_interval,
            max_record_size,
        }
    }

    /// Next complete record at or after `start`, `None` if none is available yet
    fn try_read(&mut self) -> Result<Option<Record>> {
        if self.file.is_none() {
            match File::open(&self.path) {
                Ok(file) => self.file = Some(file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };

        file.seek(SeekFrom::Start(self.pos))?;
        let mut reader = BufReader::new(file);
        loop {
            let raw = match format::read_record(&mut reader, self.max_record_size)? {
                Some(raw) => raw,
                None => return Ok(None),
            };
            self.pos += raw.encoded_len() as u64;
            if raw.offset < self.start {
                continue;
            }
            self.start = raw.offset + 1;

            let key = String::from_utf8(raw.key).map_err(|e| {
                VistaError::Codec(format!("record {} has a non utf-8 key: {}", raw.offset, e))
            })?;
            let mut record = Record::new(self.topic.clone(), self.partition, raw.offset, key, raw.value);
            if let Some(ts) = Utc.timestamp_millis_opt(raw.timestamp_ms).single() {
                record = record.with_timestamp(ts);
            }
            return Ok(Some(record));
        }
    }
}

#[async_trait]
impl PartitionConsumer for FilePartitionConsumer {
    async fn next_record(&mut self) -> Option<Result<Record>> {
        let notify = Arc::clone(&self.notify);
        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_read() {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {}
                Err(e) => return Some(Err(VistaError::consume(self.partition, e))),
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
