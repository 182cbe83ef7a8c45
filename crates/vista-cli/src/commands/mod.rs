pub mod dump;
pub mod get;
pub mod produce;
pub mod status;
pub mod watch;
