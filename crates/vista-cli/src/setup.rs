//! Shared wiring: config loading, the topic log and view construction

use crate::{HasherKind, StorageKind};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use vista::prelude::*;
use vista::{
    ConsumerBuilder, FileLogConfig, LmdbStorageConfig, StorageBuilder, TopicManagerBuilder,
};
use vista_file_log::FileTopicLog;
use vista_lmdb::LmdbStorage;

/// Command-line settings that feed [`Setup::load`]
pub struct Flags {
    pub log_dir: PathBuf,
    pub state_dir: PathBuf,
    pub topic: String,
    pub partitions: u32,
    pub hasher: HasherKind,
    pub storage: StorageKind,
    pub config: Option<PathBuf>,
}

/// Optional JSON config file. Sections present here replace the
/// corresponding command-line defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub view: Option<ViewConfig>,
    #[serde(default)]
    pub log: Option<FileLogConfig>,
    #[serde(default)]
    pub lmdb: Option<LmdbStorageConfig>,
}

impl ConfigFile {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Invalid config file")
    }
}

pub struct Setup {
    pub topic: String,
    pub storage: StorageKind,
    pub view_config: ViewConfig,
    pub lmdb_config: LmdbStorageConfig,
    pub hasher: HasherFactory,
    pub log: Arc<FileTopicLog>,
}

impl Setup {
    pub fn load(flags: Flags) -> Result<Self> {
        let file = match &flags.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                ConfigFile::parse(&raw)?
            }
            None => ConfigFile::default(),
        };

        let hasher = match flags.hasher {
            HasherKind::Murmur2 => Murmur2Hasher::factory(),
            HasherKind::Xxhash => XxHash32Hasher::factory(),
        };
        let log_config = file.log.unwrap_or_else(|| {
            FileLogConfig::new(flags.log_dir.clone()).with_partitions(flags.partitions)
        });
        let lmdb_config = file
            .lmdb
            .unwrap_or_else(|| LmdbStorageConfig::new(flags.state_dir.clone()));

        tracing::debug!(
            log_dir = %log_config.base_dir.display(),
            topic = %flags.topic,
            "opening topic log"
        );
        let log = FileTopicLog::open_with_hasher(log_config, hasher.clone())
            .context("Failed to open topic log")?;
        log.create_topic(&flags.topic)
            .with_context(|| format!("Failed to open topic {}", flags.topic))?;

        Ok(Self {
            topic: flags.topic,
            storage: flags.storage,
            view_config: file.view.unwrap_or_default(),
            lmdb_config,
            hasher,
            log: Arc::new(log),
        })
    }

    pub fn options(&self) -> ViewOptions<BytesCodec> {
        let storage: StorageBuilder = match self.storage {
            StorageKind::Lmdb => LmdbStorage::builder(self.lmdb_config.clone()),
            StorageKind::Memory => MemoryStorage::builder(),
        };

        let log = Arc::clone(&self.log);
        let topic_manager: TopicManagerBuilder =
            Arc::new(move |_brokers: &[String]| -> vista::Result<Arc<dyn TopicManager>> {
                Ok(Arc::clone(&log) as Arc<dyn TopicManager>)
            });
        let log = Arc::clone(&self.log);
        let consumer: ConsumerBuilder = Arc::new(
            move |_brokers: &[String], _client_id: &str| -> vista::Result<Arc<dyn Consumer>> {
                Ok(Arc::clone(&log) as Arc<dyn Consumer>)
            },
        );

        ViewOptions::new(BytesCodec)
            .with_hasher(self.hasher.clone())
            .with_storage_builder(storage)
            .with_topic_manager_builder(topic_manager)
            .with_consumer_builder(consumer)
            .with_config(self.view_config.clone())
    }

    pub fn view(&self) -> Result<Arc<View<BytesCodec>>> {
        let view = View::new(self.topic.clone(), self.options()).context("Failed to create view")?;
        Ok(Arc::new(view))
    }
}

/// A view whose `run` loop is executing on a background task
pub struct RunningView {
    pub view: Arc<View<BytesCodec>>,
    token: CancellationToken,
    handle: JoinHandle<vista::Result<()>>,
}

impl RunningView {
    /// Start the view and wait until every partition has recovered
    pub async fn start(view: Arc<View<BytesCodec>>) -> Result<Self> {
        let running = view.wait_running();
        let token = CancellationToken::new();
        let mut handle = tokio::spawn({
            let view = Arc::clone(&view);
            let token = token.clone();
            async move { view.run(token).await }
        });

        tokio::select! {
            res = running => {
                res.context("View state dropped before recovery finished")?;
            }
            res = &mut handle => {
                res.context("View task panicked")?
                    .context("View stopped before recovery finished")?;
                bail!("View stopped before recovery finished");
            }
        }

        tracing::debug!(topic = view.topic(), "view recovered");
        Ok(Self {
            view,
            token,
            handle,
        })
    }

    /// Resolves when the run loop ends on its own; the view is stopped after
    /// this returns.
    pub async fn finished(&mut self) -> Result<()> {
        (&mut self.handle)
            .await
            .context("View task panicked")?
            .context("View stopped")
    }

    /// Cancel the run loop and wait for partitions to shut down
    pub async fn stop(self) -> Result<()> {
        self.token.cancel();
        self.handle
            .await
            .context("View task panicked")?
            .context("View shutdown failed")
    }
}

/// Printable form of a raw value
pub fn display_value(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_sections_are_optional() {
        let file = ConfigFile::parse("{}").unwrap();
        assert!(file.view.is_none());
        assert!(file.log.is_none());

        let file = ConfigFile::parse(
            r#"{
                "view": { "client_id": "reporting", "restartable": true },
                "log": { "base_dir": "/tmp/log", "partitions": 8 }
            }"#,
        )
        .unwrap();
        let view = file.view.unwrap();
        assert_eq!(view.client_id, "reporting");
        assert!(view.restartable);
        let log = file.log.unwrap();
        assert_eq!(log.partitions, 8);
        assert_eq!(log.poll_interval_ms, 50);
        assert!(file.lmdb.is_none());
    }

    #[test]
    fn test_config_file_rejects_garbage() {
        assert!(ConfigFile::parse("not json").is_err());
    }

    #[tokio::test]
    async fn test_memory_view_over_file_log() {
        let temp = tempfile::TempDir::new().unwrap();
        let setup = Setup::load(Flags {
            log_dir: temp.path().join("log"),
            state_dir: temp.path().join("views"),
            topic: "events".to_string(),
            partitions: 2,
            hasher: HasherKind::Xxhash,
            storage: StorageKind::Memory,
            config: None,
        })
        .unwrap();
        setup.log.produce("events", "alice", b"admin").unwrap();

        let running = RunningView::start(setup.view().unwrap()).await.unwrap();
        let value = running.view.get("alice").unwrap().unwrap();
        assert_eq!(display_value(&value), "admin");
        running.stop().await.unwrap();
    }
}
