//! Offset-based reading of lines appended to a log file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::debug;

/// A log file being followed from a byte offset.
///
/// Only complete lines are returned: bytes after the last newline stay
/// unread until the line is finished. If the file shrinks below the
/// offset it is assumed to have been truncated or rotated, and reading
/// restarts from the beginning.
#[derive(Debug, Clone)]
pub struct TailedFile {
    path: PathBuf,
    offset: u64,
    workflow_id: String,
}

impl TailedFile {
    /// Starts following `path` from its current end.
    pub fn open(path: impl Into<PathBuf>, workflow_id: impl Into<String>) -> io::Result<Self> {
        let path = path.into();
        let offset = std::fs::metadata(&path)?.len();
        Ok(Self {
            path,
            offset,
            workflow_id: workflow_id.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Workflow that lines from this file are recorded against.
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Reads complete lines appended since the last call, skipping blank
    /// ones, and advances the offset past them.
    pub fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();

        if len < self.offset {
            debug!(
                "{} shrank from {} to {} bytes, reading from start",
                self.path.display(),
                self.offset,
                len
            );
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.take(len - self.offset).read_to_end(&mut buf)?;

        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };
        let complete = &buf[..=last_newline];
        self.offset += complete.len() as u64;

        let lines = String::from_utf8_lossy(complete)
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::tempdir;

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_starts_at_current_end() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("wf.log");
        fs::write(&path, "old line\n").unwrap();

        let mut tail = TailedFile::open(&path, "wf").unwrap();
        assert_eq!(tail.offset(), 9);
        assert!(tail.read_new_lines().unwrap().is_empty());

        append(&path, "new line\n");
        assert_eq!(tail.read_new_lines().unwrap(), vec!["new line"]);
        assert!(tail.read_new_lines().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        assert!(TailedFile::open("/nonexistent/wf.log", "wf").is_err());
    }

    #[test]
    fn test_partial_line_is_held_back() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("wf.log");
        fs::write(&path, "").unwrap();
        let mut tail = TailedFile::open(&path, "wf").unwrap();

        append(&path, "complete\npart");
        assert_eq!(tail.read_new_lines().unwrap(), vec!["complete"]);

        append(&path, "ial\n");
        assert_eq!(tail.read_new_lines().unwrap(), vec!["partial"]);
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("wf.log");
        fs::write(&path, "").unwrap();
        let mut tail = TailedFile::open(&path, "wf").unwrap();

        append(&path, "a\r\n\n   \nb\n");
        assert_eq!(tail.read_new_lines().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_truncation_resets_offset() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("wf.log");
        fs::write(&path, "a fairly long first line\n").unwrap();
        let mut tail = TailedFile::open(&path, "wf").unwrap();

        fs::write(&path, "short\n").unwrap();
        assert_eq!(tail.read_new_lines().unwrap(), vec!["short"]);
        assert_eq!(tail.offset(), 6);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("wf.log");
        fs::write(&path, "").unwrap();
        let mut tail = TailedFile::open(&path, "wf").unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"bad \xff byte\n").unwrap();
        let lines = tail.read_new_lines().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("bad "));
    }

    #[test]
    fn test_vanished_file_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("wf.log");
        fs::write(&path, "x\n").unwrap();
        let mut tail = TailedFile::open(&path, "wf").unwrap();

        fs::remove_file(&path).unwrap();
        assert!(tail.read_new_lines().is_err());
    }
}
