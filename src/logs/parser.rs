//! Log Line Parser
//!
//! Structured extraction from one free-text Rocoto or job log line. Every
//! field is found by an independent, unanchored search; a field that does
//! not match is left empty. Parsing never fails.

use std::fmt;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d{1,9})?").expect("timestamp pattern"));
static TASK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"task=([a-zA-Z0-9_]+)").expect("task pattern"));
static TASK_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[Tt]ask\s+([A-Za-z0-9_]+)").expect("task label pattern"));
static CYCLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"cycle=(\d[0-9A-Za-z]*)").expect("cycle pattern"));
static STATUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:INFO|WARN|ERROR|DEBUG).*?(?:succeeded|failed|submitted|running)")
        .expect("status pattern")
});
static JOB_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"jobid=(\d+)").expect("job id pattern"));
static EXIT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"exit\s*:\s*(\d+)").expect("exit code pattern"));

/// Severity of a log line.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Upper-case name, as written in log files.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    /// Tokens that may open a line logged at this level.
    fn prefixes(&self) -> &'static [&'static str] {
        match self {
            LogLevel::Debug => &["DEBUG"],
            LogLevel::Info => &["INFO"],
            LogLevel::Warning => &["WARNING", "WARN"],
            LogLevel::Error => &["ERROR"],
        }
    }

    /// Classifies a line by the first level keyword found, in precedence
    /// order ERROR, WARN, DEBUG, INFO. Lines without a keyword are INFO.
    pub fn detect(line: &str) -> Self {
        if contains_ignore_case(line, "ERROR") {
            LogLevel::Error
        } else if contains_ignore_case(line, "WARN") {
            LogLevel::Warning
        } else if contains_ignore_case(line, "DEBUG") {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed log line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LogRecord {
    pub timestamp: Option<NaiveDateTime>,
    pub level: LogLevel,
    pub task_id: Option<String>,
    pub cycle: Option<String>,
    /// Whole matched status fragment, e.g. `INFO] ... succeeded`
    pub status: Option<String>,
    pub job_id: Option<String>,
    pub exit_code: Option<i32>,
    /// Line with the timestamp and leading level token removed
    pub message: String,
    /// Original line, untouched
    pub raw: String,
}

/// Parses a single log line.
///
/// # Example
///
/// ```rust
/// use rocotoviewer::logs::{parse_log_line, LogLevel};
///
/// let record = parse_log_line("2023-10-27 10:00:00 ERROR task=post exit: 1");
/// assert_eq!(record.level, LogLevel::Error);
/// assert_eq!(record.task_id.as_deref(), Some("post"));
/// assert_eq!(record.exit_code, Some(1));
/// ```
pub fn parse_log_line(line: &str) -> LogRecord {
    let timestamp_match = TIMESTAMP_RE.find(line);
    let timestamp = timestamp_match.and_then(|m| parse_timestamp(m.as_str()));

    let task_id = TASK_RE
        .captures(line)
        .or_else(|| TASK_LABEL_RE.captures(line))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let level = LogLevel::detect(line);

    let message = match timestamp_match {
        Some(m) => {
            let mut without = String::with_capacity(line.len());
            without.push_str(&line[..m.start()]);
            without.push_str(&line[m.end()..]);
            strip_level(without.trim(), level).to_string()
        }
        None => strip_level(line.trim(), level).to_string(),
    };

    LogRecord {
        timestamp,
        level,
        task_id,
        cycle: capture(&CYCLE_RE, line),
        status: STATUS_RE.find(line).map(|m| m.as_str().to_string()),
        job_id: capture(&JOB_ID_RE, line),
        exit_code: capture(&EXIT_CODE_RE, line).and_then(|code| code.parse().ok()),
        message,
        raw: line.to_string(),
    }
}

fn capture(re: &Regex, line: &str) -> Option<String> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// Removes a leading `LEVEL` or `[LEVEL]` token, ignoring case.
fn strip_level(message: &str, level: LogLevel) -> &str {
    for token in level.prefixes() {
        let rest = strip_prefix_ignore_case(message, "[")
            .and_then(|inner| strip_prefix_ignore_case(inner, token))
            .and_then(|inner| inner.strip_prefix(']'))
            .or_else(|| {
                strip_prefix_ignore_case(message, token)
                    .filter(|rest| !rest.starts_with(|c: char| c.is_ascii_alphanumeric()))
            });

        if let Some(rest) = rest {
            let rest = rest.trim_start();
            return rest.strip_prefix(':').unwrap_or(rest).trim();
        }
    }
    message
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    let needle = needle.as_bytes();
    haystack
        .as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}
