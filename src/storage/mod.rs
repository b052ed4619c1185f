//! Storage abstractions for snapshot persistence.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml
//! ├── snapshots/{name}/{timestamp}.txt   # immutable text snapshots
//! ├── raw/{name}/{timestamp}.{pdf,html}  # downloaded bytes
//! └── diffs/{name}/{timestamp}.diff      # non-empty unified diffs
//! ```
//!
//! Timestamps use `models::TIMESTAMP_FORMAT`, so lexical order is
//! chronological order.

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{ContentKind, Snapshot};

// Re-export for convenience
pub use local::LocalStorage;

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// Persist a new snapshot. Never overwrites an existing one.
    ///
    /// Returns the location written.
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<String>;

    /// Newest snapshot of `name` captured strictly before `before`.
    async fn latest_before(&self, name: &str, before: &DateTime<Utc>) -> Result<Option<Snapshot>>;

    /// Capture times of all snapshots of `name`, oldest first.
    async fn list_snapshots(&self, name: &str) -> Result<Vec<DateTime<Utc>>>;

    /// Archive the raw downloaded bytes of a capture.
    async fn write_raw(
        &self,
        name: &str,
        captured_at: &DateTime<Utc>,
        kind: ContentKind,
        bytes: &[u8],
    ) -> Result<String>;

    /// Persist a rendered diff for a capture.
    async fn write_diff(&self, name: &str, captured_at: &DateTime<Utc>, text: &str)
    -> Result<String>;
}
