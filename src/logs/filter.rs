//! Log record filtering and summaries.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;

use super::parser::{LogLevel, LogRecord};

/// Filter over parsed log records. Every criterion that is set must
/// match; unset criteria match everything.
///
/// # Example
///
/// ```rust
/// use rocotoviewer::logs::{parse_log_line, LogFilter};
///
/// let records = vec![
///     parse_log_line("ERROR task=fcst failed"),
///     parse_log_line("INFO task=post running"),
/// ];
/// let errors = LogFilter::new().level("error").apply(&records);
/// assert_eq!(errors.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    level: Option<String>,
    task_id: Option<String>,
    status: Option<String>,
    search: Option<String>,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level name, matched exactly but case-insensitively.
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Substring of the task id.
    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Substring of the status fragment.
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Substring of the message or task id.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Inclusive lower bound on the timestamp.
    pub fn start(mut self, start: NaiveDateTime) -> Self {
        self.start = Some(start);
        self
    }

    /// Inclusive upper bound on the timestamp.
    pub fn end(mut self, end: NaiveDateTime) -> Self {
        self.end = Some(end);
        self
    }

    /// Returns true if the record passes every set criterion.
    ///
    /// Records without a timestamp never pass a time bound.
    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(level) = &self.level {
            if !record.level.as_str().eq_ignore_ascii_case(level) {
                return false;
            }
        }

        if let Some(task_id) = &self.task_id {
            if !contains(record.task_id.as_deref(), task_id) {
                return false;
            }
        }

        if let Some(status) = &self.status {
            if !contains(record.status.as_deref(), status) {
                return false;
            }
        }

        if let Some(term) = &self.search {
            if !record.message.contains(term.as_str()) && !contains(record.task_id.as_deref(), term) {
                return false;
            }
        }

        if self.start.is_some() || self.end.is_some() {
            let Some(timestamp) = record.timestamp else {
                return false;
            };
            if self.start.is_some_and(|start| timestamp < start) {
                return false;
            }
            if self.end.is_some_and(|end| timestamp > end) {
                return false;
            }
        }

        true
    }

    /// Returns the matching records, in input order.
    pub fn apply<'a>(&self, records: &'a [LogRecord]) -> Vec<&'a LogRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

fn contains(field: Option<&str>, needle: &str) -> bool {
    field.is_some_and(|value| value.contains(needle))
}

/// Aggregate view over a set of log records.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct LogSummary {
    pub total_entries: usize,
    pub level_counts: BTreeMap<LogLevel, usize>,
    pub unique_tasks: usize,
    pub first_timestamp: Option<NaiveDateTime>,
    pub last_timestamp: Option<NaiveDateTime>,
    pub has_errors: bool,
}

/// Summarizes a set of records.
pub fn summarize(records: &[LogRecord]) -> LogSummary {
    let mut level_counts = BTreeMap::new();
    let mut tasks = HashSet::new();

    for record in records {
        *level_counts.entry(record.level).or_insert(0) += 1;
        if let Some(task) = &record.task_id {
            tasks.insert(task.as_str());
        }
    }

    let timestamps = records.iter().filter_map(|r| r.timestamp);

    LogSummary {
        total_entries: records.len(),
        has_errors: level_counts.contains_key(&LogLevel::Error),
        level_counts,
        unique_tasks: tasks.len(),
        first_timestamp: timestamps.clone().min(),
        last_timestamp: timestamps.max(),
    }
}
