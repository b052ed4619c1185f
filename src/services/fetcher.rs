// src/services/fetcher.rs

//! Resource fetcher.
//!
//! Downloads a monitored resource either directly or by first locating a
//! download link on an intermediate page.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ContentKind, FetcherConfig, Locator};
use crate::utils::{http, normalize_whitespace, resolve_url};

/// Something that can GET a URL and return its body.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the raw bytes at `url`, failing with `AppError::Network`.
    async fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Raw bytes of a fetched resource.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// URL the bytes were finally read from
    pub url: String,
    pub bytes: Vec<u8>,
}

impl Fetched {
    /// Content kind of the final resource, not of the page linking to it.
    pub fn kind(&self) -> ContentKind {
        ContentKind::detect(&self.url, &self.bytes)
    }
}

/// HTTP fetcher backed by `reqwest`.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the configured timeout and redirect policy.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            client: http::create_client(config)?,
        })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::network(url, format!("HTTP status {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::network(url, e))?;

        log::debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

/// Fetch the bytes a locator points to.
///
/// Indirect locators fetch the page, resolve the first matching anchor, and
/// then fetch that URL directly.
pub async fn fetch_resource(fetcher: &dyn ResourceFetcher, locator: &Locator) -> Result<Fetched> {
    match locator {
        Locator::Direct(url) => {
            let bytes = fetcher.get(url).await?;
            Ok(Fetched {
                url: url.clone(),
                bytes,
            })
        }
        Locator::Indirect { page_url, selector } => {
            let page = fetcher.get(page_url).await?;
            let html = String::from_utf8_lossy(&page);
            let url = find_link(&html, page_url, selector)?;
            log::info!("Resolved '{}' on {} to {}", selector, page_url, url);

            let bytes = fetcher.get(&url).await?;
            Ok(Fetched { url, bytes })
        }
    }
}

/// Find the first anchor whose visible text or class contains `selector`
/// (case-insensitive) and resolve its href against `page_url`.
pub fn find_link(html: &str, page_url: &str, selector: &str) -> Result<String> {
    let needle = selector.trim().to_lowercase();
    if needle.is_empty() {
        return Err(AppError::config("link selector is empty"));
    }

    let base = Url::parse(page_url).map_err(|e| AppError::network(page_url, e))?;
    let anchors = Selector::parse("a[href]").map_err(|e| AppError::selector("a[href]", e))?;
    let document = Html::parse_document(html);

    document
        .select(&anchors)
        .find(|anchor| {
            let text = normalize_whitespace(&anchor.text().collect::<String>()).to_lowercase();
            let class = anchor.value().attr("class").unwrap_or("").to_lowercase();
            text.contains(&needle) || class.contains(&needle)
        })
        .and_then(|anchor| anchor.value().attr("href"))
        .map(|href| resolve_url(&base, href.trim()))
        .ok_or_else(|| AppError::link_not_found(page_url, selector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const PAGE: &str = r#"
        <html><body>
          <a href="/about">About ABET</a>
          <a class="button primary" href="/2025-2026_cac_criteria/">Download</a>
          <a href="files/eac.pdf">  EAC   Criteria PDF </a>
        </body></html>
    "#;

    /// Serves canned bodies and records requested URLs.
    struct StaticFetcher {
        pages: HashMap<String, Vec<u8>>,
        requested: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        fn new(pages: &[(&str, &[u8])]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.to_vec()))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ResourceFetcher for StaticFetcher {
        async fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::network(url, "HTTP status 404 Not Found"))
        }
    }

    #[test]
    fn test_find_link_by_class() {
        let url = find_link(PAGE, "https://www.abet.org/accreditation/", "button").unwrap();
        assert_eq!(url, "https://www.abet.org/2025-2026_cac_criteria/");
    }

    #[test]
    fn test_find_link_by_text_case_insensitive() {
        let url = find_link(PAGE, "https://www.abet.org/accreditation/", "eac criteria").unwrap();
        assert_eq!(url, "https://www.abet.org/accreditation/files/eac.pdf");
    }

    #[test]
    fn test_find_link_missing() {
        let err = find_link(PAGE, "https://www.abet.org/", "syllabus").unwrap_err();
        assert!(matches!(err, AppError::LinkNotFound { .. }));
    }

    #[tokio::test]
    async fn test_indirect_fetch_follows_link() {
        let fetcher = StaticFetcher::new(&[
            ("https://example.com/criteria/", PAGE.as_bytes()),
            ("https://example.com/2025-2026_cac_criteria/", b"%PDF-1.7"),
        ]);
        let locator = Locator::Indirect {
            page_url: "https://example.com/criteria/".into(),
            selector: "Download".into(),
        };

        let fetched = fetch_resource(&fetcher, &locator).await.unwrap();
        assert_eq!(fetched.url, "https://example.com/2025-2026_cac_criteria/");
        assert_eq!(fetched.bytes, b"%PDF-1.7");
        assert_eq!(fetched.kind(), ContentKind::Pdf);
        assert_eq!(fetcher.requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_indirect_fetch_link_not_found_skips_download() {
        let fetcher = StaticFetcher::new(&[("https://example.com/criteria/", PAGE.as_bytes())]);
        let locator = Locator::Indirect {
            page_url: "https://example.com/criteria/".into(),
            selector: "syllabus".into(),
        };

        let err = fetch_resource(&fetcher, &locator).await.unwrap_err();
        assert!(matches!(err, AppError::LinkNotFound { .. }));
        assert_eq!(fetcher.requested.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_http_fetch_malformed_url_is_network_error() {
        let fetcher = HttpFetcher::new(&FetcherConfig::default()).unwrap();
        let err = fetcher.get("not a url").await.unwrap_err();
        assert!(matches!(err, AppError::Network { .. }));
    }

    #[tokio::test]
    async fn test_http_fetch_unreachable_is_network_error() {
        let config = FetcherConfig {
            timeout_secs: 2,
            ..FetcherConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let err = fetcher.get("http://127.0.0.1:9/criteria.pdf").await.unwrap_err();
        assert!(matches!(err, AppError::Network { .. }));
    }
}
