//! File Monitoring Module
//!
//! Watches workflow directories and follows log files as they grow.
//!
//! # Components
//!
//! - [`FileMonitor`]: Filesystem watcher plus the log polling loop
//! - [`TailedFile`]: Offset tracking for one followed file

pub mod file_monitor;
pub mod tailer;

pub use file_monitor::{change_kind, FileMonitor, LOG_EXTENSIONS};
pub use tailer::TailedFile;
