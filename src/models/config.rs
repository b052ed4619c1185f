//! Application configuration structures.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{ContentKind, Section, Target};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP fetch settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Diff computation settings
    #[serde(default)]
    pub diff: DiffConfig,

    /// Notification settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Snapshot storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Monitored resources
    #[serde(default = "defaults::default_targets")]
    pub targets: Vec<Target>,

    /// Transport credentials (environment only)
    #[serde(skip)]
    pub secrets: Secrets,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| AppError::file_access(path, e))?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, or the defaults when the file does not exist.
    ///
    /// An unreadable or malformed file is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("No config at {}. Using defaults.", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(AppError::file_access(path, e)),
        }
    }

    /// Overlay addresses and secrets from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay addresses and secrets from an arbitrary lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(sender) = get("EMAIL_SENDER") {
            self.notify.sender = sender;
        }
        if let Some(recipient) = get("EMAIL_RECEIVER") {
            self.notify.recipient = recipient;
        }
        self.secrets = Secrets {
            smtp_username: get("SMTP_USERNAME"),
            smtp_password: get("SMTP_PASSWORD"),
            sendgrid_api_key: get("SENDGRID_API_KEY"),
        };
    }

    /// Find a target by name.
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.notify.timeout_secs == 0 {
            return Err(AppError::validation("notify.timeout_secs must be > 0"));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(AppError::validation("target with empty name"));
            }
            if target.name.contains(['/', '\\']) || target.name.starts_with('.') {
                return Err(AppError::validation(format!(
                    "target name '{}' must not be a path",
                    target.name
                )));
            }
            if !names.insert(target.name.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }
            url::Url::parse(&target.url).map_err(|e| {
                AppError::validation(format!("target '{}' has bad url: {e}", target.name))
            })?;
            if target.section.is_some() && target.kind != ContentKind::Html {
                return Err(AppError::validation(format!(
                    "target '{}' sets a section but is not html",
                    target.name
                )));
            }
        }

        self.validate_transport()
    }

    fn validate_transport(&self) -> Result<()> {
        let notify = &self.notify;
        if notify.transport == TransportKind::Log {
            return Ok(());
        }

        if notify.sender.trim().is_empty() || notify.recipient.trim().is_empty() {
            return Err(AppError::validation(
                "notify.sender and notify.recipient are required (or EMAIL_SENDER / EMAIL_RECEIVER)",
            ));
        }

        match notify.transport {
            TransportKind::Sendgrid if self.secrets.sendgrid_api_key.is_none() => Err(
                AppError::validation("SENDGRID_API_KEY is required for the sendgrid transport"),
            ),
            TransportKind::Smtp => {
                if notify.smtp_host.trim().is_empty() {
                    return Err(AppError::validation("notify.smtp_host is empty"));
                }
                if self.secrets.smtp_username.is_none() || self.secrets.smtp_password.is_none() {
                    return Err(AppError::validation(
                        "SMTP_USERNAME and SMTP_PASSWORD are required for the smtp transport",
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            diff: DiffConfig::default(),
            notify: NotifyConfig::default(),
            storage: StorageConfig::default(),
            targets: defaults::default_targets(),
            secrets: Secrets::default(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum redirects followed per request
    #[serde(default = "defaults::max_redirects")]
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_redirects: defaults::max_redirects(),
        }
    }
}

/// Diff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Unchanged lines shown around each change
    #[serde(default = "defaults::context_lines")]
    pub context_lines: usize,

    /// Send the full content on the first capture of a target
    #[serde(default)]
    pub notify_on_baseline: bool,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            context_lines: defaults::context_lines(),
            notify_on_baseline: false,
        }
    }
}

/// Which transport delivers notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Write the message to the log only
    #[default]
    Log,
    /// SendGrid v3 HTTP API
    Sendgrid,
    /// SMTP relay with STARTTLS
    Smtp,
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub transport: TransportKind,

    /// From address
    #[serde(default)]
    pub sender: String,

    /// To address
    #[serde(default)]
    pub recipient: String,

    /// Fixed subject line
    #[serde(default = "defaults::subject")]
    pub subject: String,

    #[serde(default)]
    pub smtp_host: String,

    #[serde(default = "defaults::smtp_port")]
    pub smtp_port: u16,

    /// Delivery timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    #[serde(default = "defaults::sendgrid_endpoint")]
    pub sendgrid_endpoint: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            sender: String::new(),
            recipient: String::new(),
            subject: defaults::subject(),
            smtp_host: String::new(),
            smtp_port: defaults::smtp_port(),
            timeout_secs: defaults::timeout(),
            sendgrid_endpoint: defaults::sendgrid_endpoint(),
        }
    }
}

/// Snapshot storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Also archive the raw downloaded bytes
    #[serde(default = "defaults::keep_raw")]
    pub keep_raw: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            keep_raw: defaults::keep_raw(),
        }
    }
}

/// Transport credentials, read from the environment only.
#[derive(Clone, Default)]
pub struct Secrets {
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub sendgrid_api_key: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Secrets")
            .field("smtp_username", &redact(&self.smtp_username))
            .field("smtp_password", &redact(&self.smtp_password))
            .field("sendgrid_api_key", &redact(&self.sendgrid_api_key))
            .finish()
    }
}

mod defaults {
    use super::{ContentKind, Section, Target};

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; criteria-watch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_redirects() -> usize {
        10
    }

    // Diff defaults
    pub fn context_lines() -> usize {
        3
    }

    // Notify defaults
    pub fn subject() -> String {
        "Accreditation Criteria Changes Detected".into()
    }
    pub fn smtp_port() -> u16 {
        587
    }
    pub fn sendgrid_endpoint() -> String {
        "https://api.sendgrid.com/v3/mail/send".into()
    }

    // Storage defaults
    pub fn keep_raw() -> bool {
        true
    }

    // Target defaults
    pub fn default_targets() -> Vec<Target> {
        vec![
            Target::new(
                "CS_Criteria",
                "https://www.abet.org/wp-content/uploads/2023/05/2024-2025_CAC_Criteria.pdf",
                ContentKind::Pdf,
            ),
            Target::new(
                "CSE_Criteria",
                "https://www.abet.org/wp-content/uploads/2023/05/2024-2025_EAC_Criteria.pdf",
                ContentKind::Pdf,
            ),
            Target::new(
                "CS_criteria_page",
                "https://www.abet.org/accreditation/accreditation-criteria/criteria-for-accrediting-computing-programs-2025-2026/",
                ContentKind::Html,
            )
            .with_section(Section::OrderedList {
                style_contains: "decimal".into(),
            }),
            Target::new(
                "CSE_criteria_page",
                "https://www.abet.org/accreditation/accreditation-criteria/criteria-for-accrediting-engineering-programs-2025-2026/",
                ContentKind::Html,
            )
            .with_section(Section::Accordion {
                title: "Systems and Similarly Named Engineering Programs".into(),
            }),
        ]
    }
}
