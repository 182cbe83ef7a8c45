use crate::consumer::FilePartitionConsumer;
use crate::format::{self, RawRecord};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use vista_core::{
    hash_key, Consumer, FileLogConfig, HasherFactory, Murmur2Hasher, Offset, OffsetPosition,
    PartitionConsumer, PartitionId, Result, TopicManager, VistaError,
};

/// Metadata stored in `<topic>/meta.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct TopicMeta {
    partitions: u32,

    /// Oldest offset still stored, per partition
    #[serde(default)]
    oldest_offsets: Vec<Offset>,

    /// Next offset to assign, per partition
    #[serde(default)]
    next_offsets: Vec<Offset>,
}

struct PartitionFiles {
    path: PathBuf,
    writer: Mutex<PartitionWriter>,
    notify: Arc<Notify>,
}

struct PartitionWriter {
    file: BufWriter<File>,
    oldest: Offset,
    next: Offset,
    /// Records below this offset have left the write buffer
    flushed: Offset,
}

impl PartitionWriter {
    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.flushed = self.next;
        Ok(())
    }
}

struct TopicFiles {
    dir: PathBuf,
    partitions: Vec<PartitionFiles>,
}

/// File-backed partitioned topic log
///
/// Each topic is a directory under `base_dir` holding one append-only file
/// per partition plus `meta.json`. Partition files are authoritative: on
/// open they are scanned to find the next offset, and a record cut short by
/// a crash is dropped.
///
/// Consumers opened from the same `FileTopicLog` wake on every append;
/// consumers of a log written by another process notice new records after
/// `poll_interval_ms`.
pub struct FileTopicLog {
    config: FileLogConfig,
    hasher: HasherFactory,
    topics: Mutex<HashMap<String, Arc<TopicFiles>>>,
}

impl FileTopicLog {
    /// Open or create a log rooted at `config.base_dir`
    pub fn open(config: FileLogConfig) -> Result<Self> {
        Self::open_with_hasher(config, Murmur2Hasher::factory())
    }

    /// Like [`FileTopicLog::open`], routing produced keys with `hasher`
    pub fn open_with_hasher(config: FileLogConfig, hasher: HasherFactory) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir)?;
        Ok(Self {
            config,
            hasher,
            topics: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &FileLogConfig {
        &self.config
    }

    fn topic_dir(&self, topic: &str) -> PathBuf {
        self.config.base_dir.join(topic)
    }

    fn partition_path(dir: &Path, partition: PartitionId) -> PathBuf {
        dir.join(format!("partition-{:05}.log", partition))
    }

    fn validate_topic_name(topic: &str) -> Result<()> {
        let valid = !topic.is_empty()
            && topic
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && topic != "."
            && topic != "..";
        if !valid {
            return Err(VistaError::Config(format!("invalid topic name {:?}", topic)));
        }
        Ok(())
    }

    /// Create `topic` with the configured partition count, or open it if it
    /// already exists. Returns the partition count.
    pub fn create_topic(&self, topic: &str) -> Result<usize> {
        Self::validate_topic_name(topic)?;
        let dir = self.topic_dir(topic);
        if !dir.join("meta.json").exists() {
            if self.config.partitions == 0 {
                return Err(VistaError::Config("partitions must be at least 1".into()));
            }
            std::fs::create_dir_all(&dir)?;
            let meta = TopicMeta {
                partitions: self.config.partitions,
                oldest_offsets: vec![0; self.config.partitions as usize],
                next_offsets: vec![0; self.config.partitions as usize],
            };
            save_meta(&dir, &meta)?;
            tracing::info!(topic, partitions = meta.partitions, "created topic");
        }
        Ok(self.topic(topic)?.partitions.len())
    }

    /// Names of the topics present under `base_dir`
    pub fn topics(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.config.base_dir)? {
            let entry = entry?;
            if entry.path().join("meta.json").exists() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn topic(&self, topic: &str) -> Result<Arc<TopicFiles>> {
        let mut topics = self.topics.lock();
        if let Some(files) = topics.get(topic) {
            return Ok(Arc::clone(files));
        }

        Self::validate_topic_name(topic)?;
        let dir = self.topic_dir(topic);
        let meta_path = dir.join("meta.json");
        if !meta_path.exists() {
            return Err(VistaError::Config(format!("unknown topic {:?}", topic)));
        }
        let meta: TopicMeta = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?;

        let mut partitions = Vec::with_capacity(meta.partitions as usize);
        for partition in 0..meta.partitions as PartitionId {
            let path = Self::partition_path(&dir, partition);
            let oldest = meta
                .oldest_offsets
                .get(partition as usize)
                .copied()
                .unwrap_or(0);
            let next = scan_partition(&path, oldest, self.config.max_record_size)?;
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            partitions.push(PartitionFiles {
                path,
                writer: Mutex::new(PartitionWriter {
                    file: BufWriter::with_capacity(self.config.write_buffer_size, file),
                    oldest,
                    next,
                    flushed: next,
                }),
                notify: Arc::new(Notify::new()),
            });
        }

        let files = Arc::new(TopicFiles { dir, partitions });
        topics.insert(topic.to_string(), Arc::clone(&files));
        Ok(files)
    }

    fn partition<'a>(files: &'a TopicFiles, partition: PartitionId) -> Result<&'a PartitionFiles> {
        usize::try_from(partition)
            .ok()
            .and_then(|idx| files.partitions.get(idx))
            .ok_or_else(|| {
                VistaError::Config(format!(
                    "partition {} out of range for {}",
                    partition,
                    files.dir.display()
                ))
            })
    }

    /// Append a record to the partition `key` hashes to
    pub fn produce(&self, topic: &str, key: &str, value: &[u8]) -> Result<(PartitionId, Offset)> {
        let count = self.topic(topic)?.partitions.len();
        let partition = hash_key(&self.hasher, key, count)?;
        let offset = self.produce_to(topic, partition, key, value)?;
        Ok((partition, offset))
    }

    /// Append a record to an explicit partition. An empty value is a tombstone.
    pub fn produce_to(
        &self,
        topic: &str,
        partition: PartitionId,
        key: &str,
        value: &[u8],
    ) -> Result<Offset> {
        let size = key.len() + value.len();
        if size > self.config.max_record_size {
            return Err(VistaError::InvalidState(format!(
                "record size {} exceeds max_record_size {}",
                size, self.config.max_record_size
            )));
        }

        let files = self.topic(topic)?;
        let part = Self::partition(&files, partition)?;

        let offset = {
            let mut writer = part.writer.lock();
            let record = RawRecord {
                offset: writer.next,
                timestamp_ms: Utc::now().timestamp_millis(),
                key: key.as_bytes().to_vec(),
                value: value.to_vec(),
            };
            let mut buf = Vec::with_capacity(record.encoded_len());
            format::encode(&record, &mut buf);
            writer.file.write_all(&buf)?;
            writer.next += 1;
            if self.config.flush_on_append {
                writer.flush()?;
            }
            record.offset
        };

        part.notify.notify_waiters();
        tracing::trace!(topic, partition, offset, "appended record");
        Ok(offset)
    }

    /// Flush and fsync every open partition, then rewrite each topic's metadata
    pub fn sync(&self) -> Result<()> {
        let topics: Vec<Arc<TopicFiles>> = self.topics.lock().values().cloned().collect();
        for files in topics {
            let mut meta = TopicMeta {
                partitions: files.partitions.len() as u32,
                ..TopicMeta::default()
            };
            for part in &files.partitions {
                let mut writer = part.writer.lock();
                writer.flush()?;
                writer.file.get_ref().sync_all()?;
                meta.oldest_offsets.push(writer.oldest);
                meta.next_offsets.push(writer.next);
                drop(writer);
                part.notify.notify_waiters();
            }
            save_meta(&files.dir, &meta)?;
        }
        Ok(())
    }
}

fn save_meta(dir: &Path, meta: &TopicMeta) -> Result<()> {
    let data = serde_json::to_string(meta)?;
    std::fs::write(dir.join("meta.json"), data)?;
    Ok(())
}

/// Next offset of a partition file, dropping a trailing partial record
fn scan_partition(path: &Path, oldest: Offset, max_record_size: usize) -> Result<Offset> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(oldest),
        Err(e) => return Err(e.into()),
    };
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut next = oldest;
    let mut valid_len = 0u64;
    while let Some(record) = format::read_record(&mut reader, max_record_size)? {
        valid_len += record.encoded_len() as u64;
        next = record.offset + 1;
    }

    if valid_len < file_len {
        tracing::warn!(
            path = %path.display(),
            dropped_bytes = file_len - valid_len,
            "dropping partial record at end of partition file"
        );
        OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
    }
    Ok(next)
}

impl TopicManager for FileTopicLog {
    fn partitions(&self, topic: &str) -> Result<Vec<PartitionId>> {
        let files = self.topic(topic)?;
        Ok((0..files.partitions.len() as PartitionId).collect())
    }

    fn get_offset(
        &self,
        topic: &str,
        partition: PartitionId,
        position: OffsetPosition,
    ) -> Result<Offset> {
        let files = self.topic(topic)?;
        let writer = Self::partition(&files, partition)?.writer.lock();
        Ok(match position {
            OffsetPosition::Oldest => writer.oldest,
            // Buffered records are not readable yet.
            OffsetPosition::Newest => writer.flushed,
        })
    }

    fn close(&self) -> Result<()> {
        self.sync()
    }
}

impl Consumer for FileTopicLog {
    fn consume_partition(
        &self,
        topic: &str,
        partition: PartitionId,
        offset: Offset,
    ) -> Result<Box<dyn PartitionConsumer>> {
        let files = self.topic(topic)?;
        let part = Self::partition(&files, partition)?;
        let oldest = part.writer.lock().oldest;
        if offset < oldest {
            return Err(VistaError::consume(
                partition,
                format!("offset {} is below the oldest offset {}", offset, oldest),
            ));
        }

        Ok(Box::new(FilePartitionConsumer::new(
            topic.to_string(),
            partition,
            part.path.clone(),
            offset,
            Arc::clone(&part.notify),
            Duration::from_millis(self.config.poll_interval_ms),
            self.config.max_record_size,
        )))
    }
}

/// Ensure buffered records and metadata reach disk on drop
impl Drop for FileTopicLog {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            tracing::warn!(error = %e, "failed to sync file topic log on drop");
        }
    }
}
