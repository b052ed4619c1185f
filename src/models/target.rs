//! Monitored resource definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Declared content kind of a monitored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Pdf,
    Html,
}

impl ContentKind {
    /// Guess the kind from a URL path (".pdf" suffix means PDF).
    pub fn infer(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.to_lowercase().ends_with(".pdf") {
            Self::Pdf
        } else {
            Self::Html
        }
    }

    /// Detect the kind of downloaded bytes: the `%PDF` magic wins,
    /// otherwise the URL decides.
    pub fn detect(url: &str, bytes: &[u8]) -> Self {
        if bytes.trim_ascii_start().starts_with(b"%PDF") {
            Self::Pdf
        } else {
            Self::infer(url)
        }
    }

    /// File extension used when archiving raw bytes.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ContentKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "html" | "htm" => Ok(Self::Html),
            other => Err(AppError::UnsupportedFormat(format!(
                "unknown content kind '{other}' (expected pdf or html)"
            ))),
        }
    }
}

/// How to reach the bytes of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// GET the URL itself
    Direct(String),
    /// GET a page, find an anchor matching `selector`, then GET its href
    Indirect { page_url: String, selector: String },
}

impl Locator {
    /// URL that is requested first.
    pub fn entry_url(&self) -> &str {
        match self {
            Self::Direct(url) => url,
            Self::Indirect { page_url, .. } => page_url,
        }
    }
}

/// Part of an HTML page to keep before line extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Section {
    /// Items of the first `<ol>` whose style attribute contains a substring
    OrderedList { style_contains: String },

    /// Content of the accordion item with this exact header title
    Accordion { title: String },

    /// Siblings between `h2#start_id` and `h2#end_id` (or the next `h2`)
    BetweenHeadings {
        start_id: String,
        #[serde(default)]
        end_id: Option<String>,
    },

    /// Items of the first `<ol>` after a heading containing some text
    ListAfterHeading {
        #[serde(default = "default_heading_tag")]
        tag: String,
        text_contains: String,
    },
}

fn default_heading_tag() -> String {
    "h3".into()
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrderedList { style_contains } => write!(f, "ol[style*={style_contains}]"),
            Self::Accordion { title } => write!(f, "accordion '{title}'"),
            Self::BetweenHeadings { start_id, end_id } => match end_id {
                Some(end) => write!(f, "h2#{start_id}..h2#{end}"),
                None => write!(f, "h2#{start_id}.."),
            },
            Self::ListAfterHeading { tag, text_contains } => {
                write!(f, "ol after {tag} '{text_contains}'")
            }
        }
    }
}

/// A named resource to watch for changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Logical snapshot name (e.g., "CS_criteria")
    pub name: String,

    /// Resource URL, or the containing page for indirect fetches
    pub url: String,

    /// Declared content kind of the final resource
    pub kind: ContentKind,

    /// Anchor text/class to follow from `url` before downloading
    #[serde(default)]
    pub link_selector: Option<String>,

    /// HTML section to scope extraction to
    #[serde(default)]
    pub section: Option<Section>,
}

impl Target {
    /// Create a direct target.
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind,
            link_selector: None,
            section: None,
        }
    }

    /// Follow a link on `url` before downloading.
    pub fn via_link(mut self, selector: impl Into<String>) -> Self {
        self.link_selector = Some(selector.into());
        self
    }

    /// Scope HTML extraction to a section.
    pub fn with_section(mut self, section: Section) -> Self {
        self.section = Some(section);
        self
    }

    /// Build the fetch locator for this target.
    pub fn locator(&self) -> Locator {
        match &self.link_selector {
            Some(selector) => Locator::Indirect {
                page_url: self.url.clone(),
                selector: selector.clone(),
            },
            None => Locator::Direct(self.url.clone()),
        }
    }
}
