//! Vista CLI - produce records into a file log and materialize it into a view

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod setup;

#[derive(Parser)]
#[command(name = "vista")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory of the file-backed topic log
    #[arg(short, long, default_value = "./data/log")]
    log_dir: PathBuf,

    /// Directory of the LMDB view storage
    #[arg(short, long, default_value = "./data/views")]
    state_dir: PathBuf,

    /// Topic the view mirrors
    #[arg(short, long, default_value = "events")]
    topic: String,

    /// Partition count used when the topic does not exist yet
    #[arg(short, long, default_value_t = 4)]
    partitions: u32,

    /// Key hasher shared by producer and view
    #[arg(long, value_enum, default_value_t = HasherKind::Murmur2)]
    hasher: HasherKind,

    /// Where the view keeps its state
    #[arg(long, value_enum, default_value_t = StorageKind::Lmdb)]
    storage: StorageKind,

    /// JSON config file with optional `view`, `log` and `lmdb` sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HasherKind {
    Murmur2,
    Xxhash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    Lmdb,
    Memory,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a record; an empty value is a tombstone
    Produce {
        key: String,

        #[arg(default_value = "")]
        value: String,

        /// Write to this partition instead of the key's hash partition
        #[arg(long)]
        partition: Option<i32>,
    },

    /// Recover the view, then read one key
    Get { key: String },

    /// Recover the view, then print every key and value
    Dump {
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Per-partition log offsets and local bookmarks
    Status,

    /// Recover the view and keep tailing until Ctrl+C
    Watch {
        /// Seconds between statistics reports
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let setup = setup::Setup::load(setup::Flags {
        log_dir: cli.log_dir,
        state_dir: cli.state_dir,
        topic: cli.topic,
        partitions: cli.partitions,
        hasher: cli.hasher,
        storage: cli.storage,
        config: cli.config,
    })?;

    match cli.command {
        Commands::Produce {
            key,
            value,
            partition,
        } => {
            commands::produce::execute(&setup, &key, value.as_bytes(), partition)?;
        }
        Commands::Get { key } => {
            commands::get::execute(&setup, &key).await?;
        }
        Commands::Dump { json } => {
            commands::dump::execute(&setup, json).await?;
        }
        Commands::Status => {
            commands::status::execute(&setup)?;
        }
        Commands::Watch { interval } => {
            commands::watch::execute(&setup, interval).await?;
        }
    }

    Ok(())
}
