// src/models/mod.rs

//! Domain models for the watcher.
//!
//! Configuration, monitored targets, and captured snapshots.

mod config;
mod snapshot;
mod target;

// Re-export all public types
pub use config::{
    Config, DiffConfig, FetcherConfig, NotifyConfig, Secrets, StorageConfig, TransportKind,
};
pub use snapshot::{Snapshot, TIMESTAMP_FORMAT, format_stamp, parse_stamp};
pub use target::{ContentKind, Locator, Section, Target};
