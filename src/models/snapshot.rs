//! Captured plain-text snapshot of a monitored resource.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// Timestamp format used in snapshot file names (sortable, UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Line-oriented text of a resource at one point in time.
///
/// Snapshots are immutable once written; a new capture is a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Logical resource name (e.g., "CS_criteria")
    pub name: String,

    /// Capture time
    pub captured_at: DateTime<Utc>,

    /// Ordered text lines, without terminators
    pub lines: Vec<String>,
}

impl Snapshot {
    /// Create a snapshot captured now.
    pub fn capture(name: impl Into<String>, lines: Vec<String>) -> Self {
        Self::at(name, Utc::now(), lines)
    }

    /// Create a snapshot with an explicit capture time.
    pub fn at(name: impl Into<String>, captured_at: DateTime<Utc>, lines: Vec<String>) -> Self {
        Self {
            name: name.into(),
            captured_at,
            lines,
        }
    }

    /// Capture time formatted for file names.
    pub fn stamp(&self) -> String {
        format_stamp(&self.captured_at)
    }

    /// Render as UTF-8 text with a trailing newline per line.
    pub fn to_text(&self) -> String {
        let mut text = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    /// Split file content back into lines.
    pub fn parse_lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    /// Read a snapshot file from an explicit path.
    ///
    /// The name is taken from `name`; the capture time from the file stem
    /// when it is a snapshot timestamp, otherwise from the file's mtime.
    pub fn read_from(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| AppError::file_access(path, e))?;

        let captured_at = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(parse_stamp)
            .or_else(|| {
                std::fs::metadata(path)
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from)
            })
            .unwrap_or_else(Utc::now);

        Ok(Self::at(name, captured_at, Self::parse_lines(&text)))
    }

    /// Hex SHA-256 of the rendered text.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.to_text().as_bytes()))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Format a timestamp the way snapshot file names use it.
pub fn format_stamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a snapshot file stem back into a timestamp.
pub fn parse_stamp(stem: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(stem, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
