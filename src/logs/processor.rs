//! Streaming Log Processor
//!
//! Receives parsed lines from the file monitor, keeps a bounded buffer of
//! recent records per file, and fans each record out to per-file stream
//! callbacks.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error};
use parking_lot::Mutex;

use super::parser::{parse_log_line, LogRecord};
use crate::config::{Config, DEFAULT_MAX_LOG_LINES};
use crate::error::{run_handler, HandlerResult};

/// Consumer of parsed log lines, injected into the file monitor.
pub trait LogProcessor: Send + Sync {
    /// Handles one line read from `path`.
    fn process_line(&self, path: &Path, record: &LogRecord);
}

/// Callback receiving each record appended to a followed file.
pub type StreamCallback = Arc<dyn Fn(&Path, &LogRecord) -> HandlerResult + Send + Sync>;

/// Identifies a registered stream callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// [`LogProcessor`] with per-file ring buffers and stream callbacks.
pub struct StreamingLogProcessor {
    max_lines: usize,
    buffers: Mutex<HashMap<PathBuf, VecDeque<LogRecord>>>,
    callbacks: Mutex<HashMap<PathBuf, Vec<(CallbackId, StreamCallback)>>>,
    next_id: AtomicU64,
}

impl Default for StreamingLogProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl StreamingLogProcessor {
    /// Creates a processor keeping at most `max_lines` records per file.
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            buffers: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Creates a processor sized by `display.max_log_lines`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.display.max_log_lines)
    }

    /// Registers a callback for records read from `path`.
    pub fn register_stream_callback<F>(&self, path: impl Into<PathBuf>, callback: F) -> CallbackId
    where
        F: Fn(&Path, &LogRecord) -> HandlerResult + Send + Sync + 'static,
    {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks
            .lock()
            .entry(path.into())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes a stream callback. Returns false if it was not registered.
    pub fn unregister_stream_callback(&self, path: &Path, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let Some(list) = callbacks.get_mut(path) else {
            return false;
        };

        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            callbacks.remove(path);
        }
        removed
    }

    /// Returns up to `n` of the most recent records for `path`, oldest first.
    pub fn recent(&self, path: &Path, n: usize) -> Vec<LogRecord> {
        let buffers = self.buffers.lock();
        buffers
            .get(path)
            .map(|buffer| {
                let skip = buffer.len().saturating_sub(n);
                buffer.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Number of buffered records for `path`.
    pub fn buffered(&self, path: &Path) -> usize {
        self.buffers.lock().get(path).map_or(0, VecDeque::len)
    }

    /// Drops the buffer for `path`.
    pub fn clear(&self, path: &Path) {
        self.buffers.lock().remove(path);
    }

    /// Parses the last `max_lines` non-empty lines of a file.
    ///
    /// Read failures are logged and yield an empty list.
    pub fn read_log_file(&self, path: &Path, max_lines: usize) -> Vec<LogRecord> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to read log file {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        let content = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = content
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .collect();
        let skip = lines.len().saturating_sub(max_lines);

        lines[skip..].iter().map(|line| parse_log_line(line)).collect()
    }
}

impl LogProcessor for StreamingLogProcessor {
    fn process_line(&self, path: &Path, record: &LogRecord) {
        {
            let mut buffers = self.buffers.lock();
            let buffer = buffers.entry(path.to_path_buf()).or_default();
            if buffer.len() == self.max_lines {
                buffer.pop_front();
            }
            buffer.push_back(record.clone());
        }

        let callbacks: Vec<StreamCallback> = self
            .callbacks
            .lock()
            .get(path)
            .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        debug!(
            "Processed line from {} ({} stream callbacks)",
            path.display(),
            callbacks.len()
        );
        for callback in callbacks {
            run_handler("Log stream", || callback(path, record));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    #[test]
    fn test_ring_buffer_is_capped() {
        let processor = StreamingLogProcessor::new(3);
        let path = Path::new("/tmp/a.log");
        for i in 0..5 {
            processor.process_line(path, &parse_log_line(&format!("line {}", i)));
        }

        assert_eq!(processor.buffered(path), 3);
        let recent = processor.recent(path, 10);
        let raws: Vec<_> = recent.iter().map(|r| r.raw.as_str()).collect();
        assert_eq!(raws, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(processor.recent(path, 1)[0].raw, "line 4");
    }

    #[test]
    fn test_clear_drops_only_that_file() {
        let processor = StreamingLogProcessor::new(10);
        let a = Path::new("/tmp/a.log");
        let b = Path::new("/tmp/b.log");
        processor.process_line(a, &parse_log_line("one"));
        processor.process_line(b, &parse_log_line("two"));

        processor.clear(a);
        assert_eq!(processor.buffered(a), 0);
        assert!(processor.recent(a, 5).is_empty());
        assert_eq!(processor.buffered(b), 1);

        processor.process_line(a, &parse_log_line("three"));
        assert_eq!(processor.recent(a, 5)[0].raw, "three");
    }

    #[test]
    fn test_recent_unknown_path_is_empty() {
        let processor = StreamingLogProcessor::default();
        assert!(processor.recent(Path::new("nope.log"), 5).is_empty());
    }

    #[test]
    fn test_stream_callbacks_per_path() {
        let processor = StreamingLogProcessor::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let id = processor.register_stream_callback("/tmp/a.log", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        processor.process_line(Path::new("/tmp/a.log"), &parse_log_line("one"));
        processor.process_line(Path::new("/tmp/b.log"), &parse_log_line("two"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(processor.unregister_stream_callback(Path::new("/tmp/a.log"), id));
        assert!(!processor.unregister_stream_callback(Path::new("/tmp/a.log"), id));
        processor.process_line(Path::new("/tmp/a.log"), &parse_log_line("three"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_callback_does_not_block_others() {
        let processor = StreamingLogProcessor::default();
        let hits = Arc::new(AtomicUsize::new(0));

        processor.register_stream_callback("x.log", |_, _| Err("bad subscriber".into()));
        let counter = Arc::clone(&hits);
        processor.register_stream_callback("x.log", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        processor.process_line(Path::new("x.log"), &parse_log_line("ERROR boom"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(processor.buffered(Path::new("x.log")), 1);
    }

    #[test]
    fn test_read_log_file_tail() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("job.log");
        fs::write(&path, "first\n\nsecond\r\nINFO third\nERROR fourth\n").unwrap();

        let processor = StreamingLogProcessor::default();
        let records = processor.read_log_file(&path, 2);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].raw, "INFO third");
        assert_eq!(records[1].raw, "ERROR fourth");

        let all = processor.read_log_file(&path, 100);
        assert_eq!(all.len(), 4);
        assert_eq!(all[1].raw, "second");
    }

    #[test]
    fn test_read_missing_log_file_is_empty() {
        let processor = StreamingLogProcessor::default();
        assert!(processor.read_log_file(Path::new("/nonexistent/job.log"), 10).is_empty());
    }
}
