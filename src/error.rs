// src/error.rs

//! Unified error handling for the watcher.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Fetch failed: timeout, connection error, or non-success status
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    /// Indirect fetch could not find a matching download link
    #[error("No link matching '{selector}' found on {page}")]
    LinkNotFound { page: String, selector: String },

    /// No parser backend is available for the content kind
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Snapshot or output file could not be read or written
    #[error("File access error for {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Notification transport failed
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Document bytes could not be parsed at all
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// A configured HTML section was missing from the page
    #[error("Section {section} not found for target '{target}'")]
    SectionNotFound { target: String, section: String },

    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a network error for a URL.
    pub fn network(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Network {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a link lookup error.
    pub fn link_not_found(page: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::LinkNotFound {
            page: page.into(),
            selector: selector.into(),
        }
    }

    /// Create a file access error for a path.
    pub fn file_access(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a delivery error.
    pub fn delivery(message: impl fmt::Display) -> Self {
        Self::Delivery(message.to_string())
    }

    /// Create an extraction error.
    pub fn extraction(message: impl fmt::Display) -> Self {
        Self::Extraction(message.to_string())
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error aborts a run.
    ///
    /// Delivery failures are downgraded to warnings by the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Delivery(_))
    }
}
