pub mod file_log;
pub mod lmdb;
pub mod view;

pub use file_log::FileLogConfig;
pub use lmdb::{LmdbStorageConfig, SyncMode};
pub use view::ViewConfig;
