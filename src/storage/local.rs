//! Local filesystem storage implementation.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Watcher configuration
//! ├── snapshots/            # Immutable text snapshots
//! │   └── {name}/{ts}.txt
//! ├── raw/                  # Raw downloads
//! │   └── {name}/{ts}.pdf
//! └── diffs/                # Change reports
//!     └── {name}/{ts}.diff
//! ```
//!
//! Writes go to a temporary file and are renamed into place. There is no
//! locking; a single process instance is expected per storage root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ContentKind, Snapshot, format_stamp, parse_stamp};
use crate::storage::SnapshotStorage;

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn snapshot_key(name: &str, stamp: &str) -> String {
        format!("snapshots/{}/{}.txt", name, stamp)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::file_access(parent, e))?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    ///
    /// With `create_new`, an existing file at the key is an error.
    async fn write_bytes(&self, key: &str, bytes: &[u8], create_new: bool) -> Result<String> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        if create_new && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(AppError::file_access(
                &path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "refusing to overwrite"),
            ));
        }

        let tmp = path.with_extension("tmp");
        let write = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await?;
            Ok::<_, std::io::Error>(())
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::file_access(&path, e));
        }

        Ok(path.display().to_string())
    }

    /// Read text, returning None if the file doesn't exist.
    async fn read_text(&self, key: &str) -> Result<Option<String>> {
        let path = self.path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::file_access(&path, e)),
        }
    }
}

#[async_trait]
impl SnapshotStorage for LocalStorage {
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<String> {
        let key = Self::snapshot_key(&snapshot.name, &snapshot.stamp());
        let location = self
            .write_bytes(&key, snapshot.to_text().as_bytes(), true)
            .await?;
        log::info!(
            "Snapshot {} written: {} lines to {}",
            snapshot.name,
            snapshot.lines.len(),
            location
        );
        Ok(location)
    }

    async fn latest_before(&self, name: &str, before: &DateTime<Utc>) -> Result<Option<Snapshot>> {
        let Some(captured_at) = self
            .list_snapshots(name)
            .await?
            .into_iter()
            .rev()
            .find(|ts| ts < before)
        else {
            log::debug!("No snapshot of {} before {}", name, format_stamp(before));
            return Ok(None);
        };

        let key = Self::snapshot_key(name, &format_stamp(&captured_at));
        let text = self.read_text(&key).await?.ok_or_else(|| {
            AppError::file_access(
                self.path(&key),
                std::io::Error::new(std::io::ErrorKind::NotFound, "snapshot vanished"),
            )
        })?;

        Ok(Some(Snapshot::at(
            name,
            captured_at,
            Snapshot::parse_lines(&text),
        )))
    }

    async fn list_snapshots(&self, name: &str) -> Result<Vec<DateTime<Utc>>> {
        let dir = self.path(&format!("snapshots/{}", name));
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::file_access(&dir, e)),
        };

        let mut stamps = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::file_access(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            if let Some(ts) = path.file_stem().and_then(|s| s.to_str()).and_then(parse_stamp) {
                stamps.push(ts);
            }
        }

        stamps.sort();
        Ok(stamps)
    }

    async fn write_raw(
        &self,
        name: &str,
        captured_at: &DateTime<Utc>,
        kind: ContentKind,
        bytes: &[u8],
    ) -> Result<String> {
        let key = format!(
            "raw/{}/{}.{}",
            name,
            format_stamp(captured_at),
            kind.extension()
        );
        self.write_bytes(&key, bytes, true).await
    }

    async fn write_diff(
        &self,
        name: &str,
        captured_at: &DateTime<Utc>,
        text: &str,
    ) -> Result<String> {
        let key = format!("diffs/{}/{}.diff", name, format_stamp(captured_at));
        self.write_bytes(&key, text.as_bytes(), false).await
    }
}
