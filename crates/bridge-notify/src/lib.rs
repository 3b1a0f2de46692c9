pub mod daemon;

pub use daemon::{NotifyConfig, NotifyDaemon};
