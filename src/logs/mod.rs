//! Log Processing Module
//!
//! Turns raw log lines into structured records and keeps recent records
//! for followed files.
//!
//! # Components
//!
//! - [`parse_log_line`]: Regex-based extraction from a single line
//! - [`LogFilter`]: Combinable record filters
//! - [`StreamingLogProcessor`]: Per-file buffers and stream callbacks

pub mod filter;
pub mod parser;
pub mod processor;

pub use filter::{summarize, LogFilter, LogSummary};
pub use parser::{parse_log_line, LogLevel, LogRecord};
pub use processor::{CallbackId, LogProcessor, StreamCallback, StreamingLogProcessor};
