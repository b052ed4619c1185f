//! End-to-end watch runs against an in-memory fetcher and recording mail transports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use criteria_watch::error::{AppError, Result};
use criteria_watch::models::{Config, ContentKind, Section, Snapshot, Target};
use criteria_watch::pipeline::{NotificationStatus, RunOutcome, WatchContext, run_all, run_target};
use criteria_watch::services::{HttpFetcher, MailTransport, Message, Notifier, ResourceFetcher};
use criteria_watch::storage::{LocalStorage, SnapshotStorage};

const PAGE_URL: &str = "https://criteria.test/computing";

/// Serves canned pages; anything else is a 404.
struct PageFetcher {
    pages: HashMap<String, String>,
}

impl PageFetcher {
    fn serving(url: &str, lines: &[&str]) -> Self {
        let body: String = lines.iter().map(|l| format!("<p>{l}</p>")).collect();
        let html = format!("<html><body>{body}</body></html>");
        Self {
            pages: HashMap::from([(url.to_string(), html)]),
        }
    }
}

#[async_trait]
impl ResourceFetcher for PageFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.pages
            .get(url)
            .map(|html| html.clone().into_bytes())
            .ok_or_else(|| AppError::network(url, "HTTP status 404 Not Found"))
    }
}

/// Records every message it is asked to send.
#[derive(Clone, Default)]
struct RecordingTransport {
    sent: Arc<Mutex<Vec<Message>>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: &Message) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Rejects the login like a misconfigured SMTP relay.
struct RejectingTransport;

#[async_trait]
impl MailTransport for RejectingTransport {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    async fn send(&self, _message: &Message) -> Result<()> {
        Err(AppError::delivery("535 5.7.8 authentication failed"))
    }
}

/// Local storage whose raw or diff writes fail once when armed.
struct FlakyStorage {
    inner: LocalStorage,
    fail_raw: AtomicBool,
    fail_diff: AtomicBool,
}

impl FlakyStorage {
    fn new(inner: LocalStorage) -> Self {
        Self {
            inner,
            fail_raw: AtomicBool::new(false),
            fail_diff: AtomicBool::new(false),
        }
    }

    fn disk_full(what: &str) -> AppError {
        AppError::file_access(
            what,
            std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full"),
        )
    }
}

#[async_trait]
impl SnapshotStorage for FlakyStorage {
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<String> {
        self.inner.write_snapshot(snapshot).await
    }

    async fn latest_before(&self, name: &str, before: &DateTime<Utc>) -> Result<Option<Snapshot>> {
        self.inner.latest_before(name, before).await
    }

    async fn list_snapshots(&self, name: &str) -> Result<Vec<DateTime<Utc>>> {
        self.inner.list_snapshots(name).await
    }

    async fn write_raw(
        &self,
        name: &str,
        captured_at: &DateTime<Utc>,
        kind: ContentKind,
        bytes: &[u8],
    ) -> Result<String> {
        if self.fail_raw.swap(false, Ordering::SeqCst) {
            return Err(Self::disk_full("raw"));
        }
        self.inner.write_raw(name, captured_at, kind, bytes).await
    }

    async fn write_diff(
        &self,
        name: &str,
        captured_at: &DateTime<Utc>,
        text: &str,
    ) -> Result<String> {
        if self.fail_diff.swap(false, Ordering::SeqCst) {
            return Err(Self::disk_full("diff"));
        }
        self.inner.write_diff(name, captured_at, text).await
    }
}

fn target() -> Target {
    Target::new("CS_criteria_page", PAGE_URL, ContentKind::Html)
}

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

async fn seed(storage: &LocalStorage, name: &str, items: &[&str]) -> String {
    let earlier = Utc::now() - Duration::hours(1);
    storage
        .write_snapshot(&Snapshot::at(name, earlier, lines(items)))
        .await
        .unwrap()
}

fn recording_notifier(config: &Config) -> (Notifier, Arc<Mutex<Vec<Message>>>) {
    let transport = RecordingTransport::default();
    let sent = Arc::clone(&transport.sent);
    (Notifier::new(&config.notify, Box::new(transport)), sent)
}

#[tokio::test]
async fn changed_content_sends_one_notification() {
    let tmp = TempDir::new().unwrap();
    let storage = LocalStorage::new(tmp.path());
    let config = Config::default();
    seed(&storage, "CS_criteria_page", &["A", "B", "C"]).await;

    let fetcher = PageFetcher::serving(PAGE_URL, &["A", "B", "D"]);
    let (notifier, sent) = recording_notifier(&config);
    let ctx = WatchContext {
        config: &config,
        fetcher: &fetcher,
        storage: &storage,
        notifier: &notifier,
    };

    let report = run_target(&ctx, &target()).await.unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::Changed {
            hunks: 1,
            added: 1,
            removed: 1,
            notification: NotificationStatus::Sent,
        }
    );

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("@@ -1,3 +1,3 @@\n A\n B\n-C\n+D\n"));

    let diff_path = report.diff_location.unwrap();
    let diff = std::fs::read_to_string(diff_path).unwrap();
    assert!(diff.starts_with("--- CS_criteria_page ("));
    assert!(diff.ends_with("-C\n+D\n"));
}

#[tokio::test]
async fn unchanged_content_is_not_reported() {
    let tmp = TempDir::new().unwrap();
    let storage = LocalStorage::new(tmp.path());
    let config = Config::default();
    seed(&storage, "CS_criteria_page", &["X", "Y"]).await;

    let fetcher = PageFetcher::serving(PAGE_URL, &["X", "Y"]);
    let (notifier, sent) = recording_notifier(&config);
    let ctx = WatchContext {
        config: &config,
        fetcher: &fetcher,
        storage: &storage,
        notifier: &notifier,
    };

    let report = run_target(&ctx, &target()).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Unchanged);
    assert!(report.diff_location.is_none());
    assert!(sent.lock().unwrap().is_empty());
    assert_eq!(storage.list_snapshots("CS_criteria_page").await.unwrap().len(), 2);
}

#[tokio::test]
async fn network_failure_writes_no_snapshot() {
    let tmp = TempDir::new().unwrap();
    let storage = LocalStorage::new(tmp.path());
    let config = Config::default();
    let prior = seed(&storage, "CS_criteria_page", &["A", "B", "C"]).await;
    let prior_text = std::fs::read_to_string(&prior).unwrap();

    let fetcher = HttpFetcher::new(&config.fetcher).unwrap();
    let (notifier, sent) = recording_notifier(&config);
    let ctx = WatchContext {
        config: &config,
        fetcher: &fetcher,
        storage: &storage,
        notifier: &notifier,
    };

    let broken = Target::new("CS_criteria_page", "not a url", ContentKind::Html);
    let err = run_target(&ctx, &broken).await.unwrap_err();
    assert!(matches!(err, AppError::Network { .. }));

    assert_eq!(storage.list_snapshots("CS_criteria_page").await.unwrap().len(), 1);
    assert_eq!(std::fs::read_to_string(&prior).unwrap(), prior_text);
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn delivery_failure_still_succeeds() {
    let tmp = TempDir::new().unwrap();
    let storage = LocalStorage::new(tmp.path());
    let config = Config::default();
    seed(&storage, "CS_criteria_page", &["A", "B", "C"]).await;

    let fetcher = PageFetcher::serving(PAGE_URL, &["A", "B", "D"]);
    let notifier = Notifier::new(&config.notify, Box::new(RejectingTransport));
    let ctx = WatchContext {
        config: &config,
        fetcher: &fetcher,
        storage: &storage,
        notifier: &notifier,
    };

    let report = run_target(&ctx, &target()).await.unwrap();
    match report.outcome {
        RunOutcome::Changed {
            notification: NotificationStatus::Failed(reason),
            ..
        } => assert!(reason.contains("authentication failed")),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let persisted = std::fs::read_to_string(&report.snapshot_location).unwrap();
    assert_eq!(persisted, "A\nB\nD\n");
    assert_eq!(storage.list_snapshots("CS_criteria_page").await.unwrap().len(), 2);
}

#[tokio::test]
async fn first_run_is_a_silent_baseline() {
    let tmp = TempDir::new().unwrap();
    let storage = LocalStorage::new(tmp.path());
    let config = Config::default();

    let fetcher = PageFetcher::serving(PAGE_URL, &["A", "B"]);
    let (notifier, sent) = recording_notifier(&config);
    let ctx = WatchContext {
        config: &config,
        fetcher: &fetcher,
        storage: &storage,
        notifier: &notifier,
    };

    let report = run_target(&ctx, &target()).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Baseline);
    assert!(sent.lock().unwrap().is_empty());
    assert!(tmp.path().join("raw/CS_criteria_page").is_dir());
}

#[tokio::test]
async fn baseline_notification_can_be_enabled() {
    let tmp = TempDir::new().unwrap();
    let storage = LocalStorage::new(tmp.path());
    let mut config = Config::default();
    config.diff.notify_on_baseline = true;
    config.storage.keep_raw = false;

    let fetcher = PageFetcher::serving(PAGE_URL, &["A", "B"]);
    let (notifier, sent) = recording_notifier(&config);
    let ctx = WatchContext {
        config: &config,
        fetcher: &fetcher,
        storage: &storage,
        notifier: &notifier,
    };

    let report = run_target(&ctx, &target()).await.unwrap();
    assert!(matches!(report.outcome, RunOutcome::Changed { added: 2, removed: 0, .. }));
    assert!(sent.lock().unwrap()[0].body.contains("@@ -0,0 +1,2 @@\n+A\n+B\n"));
    assert!(!tmp.path().join("raw").exists());
}

#[tokio::test]
async fn missing_section_aborts_before_snapshot() {
    let tmp = TempDir::new().unwrap();
    let storage = LocalStorage::new(tmp.path());
    let config = Config::default();

    let fetcher = PageFetcher::serving(PAGE_URL, &["A"]);
    let (notifier, _sent) = recording_notifier(&config);
    let ctx = WatchContext {
        config: &config,
        fetcher: &fetcher,
        storage: &storage,
        notifier: &notifier,
    };

    let scoped = target().with_section(Section::Accordion {
        title: "Systems and Similarly Named Engineering Programs".into(),
    });
    let err = run_target(&ctx, &scoped).await.unwrap_err();
    assert!(matches!(err, AppError::SectionNotFound { .. }));
    assert!(storage.list_snapshots("CS_criteria_page").await.unwrap().is_empty());
}

#[tokio::test]
async fn run_all_continues_past_failures() {
    let tmp = TempDir::new().unwrap();
    let storage = LocalStorage::new(tmp.path());
    let config = Config::default();

    let fetcher = PageFetcher::serving(PAGE_URL, &["A"]);
    let (notifier, _sent) = recording_notifier(&config);
    let ctx = WatchContext {
        config: &config,
        fetcher: &fetcher,
        storage: &storage,
        notifier: &notifier,
    };

    let targets = vec![
        Target::new("Gone", "https://criteria.test/missing.pdf", ContentKind::Pdf),
        target(),
    ];
    let summary = run_all(&ctx, &targets).await;

    assert!(!summary.is_success());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].0, "Gone");
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].target, "CS_criteria_page");
}

#[tokio::test]
async fn failed_raw_archive_keeps_change_for_next_run() {
    let tmp = TempDir::new().unwrap();
    let storage = FlakyStorage::new(LocalStorage::new(tmp.path()));
    let config = Config::default();
    seed(&storage.inner, "CS_criteria_page", &["A", "B", "C"]).await;
    storage.fail_raw.store(true, Ordering::SeqCst);

    let fetcher = PageFetcher::serving(PAGE_URL, &["A", "B", "D"]);
    let (notifier, sent) = recording_notifier(&config);
    let ctx = WatchContext {
        config: &config,
        fetcher: &fetcher,
        storage: &storage,
        notifier: &notifier,
    };

    let err = run_target(&ctx, &target()).await.unwrap_err();
    assert!(matches!(err, AppError::FileAccess { .. }));
    assert_eq!(storage.list_snapshots("CS_criteria_page").await.unwrap().len(), 1);

    let report = run_target(&ctx, &target()).await.unwrap();
    assert!(matches!(report.outcome, RunOutcome::Changed { hunks: 1, .. }));
    assert_eq!(sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_diff_write_still_notifies() {
    let tmp = TempDir::new().unwrap();
    let storage = FlakyStorage::new(LocalStorage::new(tmp.path()));
    let config = Config::default();
    seed(&storage.inner, "CS_criteria_page", &["A", "B", "C"]).await;
    storage.fail_diff.store(true, Ordering::SeqCst);

    let fetcher = PageFetcher::serving(PAGE_URL, &["A", "B", "D"]);
    let (notifier, sent) = recording_notifier(&config);
    let ctx = WatchContext {
        config: &config,
        fetcher: &fetcher,
        storage: &storage,
        notifier: &notifier,
    };

    let report = run_target(&ctx, &target()).await.unwrap();
    assert!(matches!(
        report.outcome,
        RunOutcome::Changed {
            notification: NotificationStatus::Sent,
            ..
        }
    ));
    assert!(report.diff_location.is_none());
    assert_eq!(sent.lock().unwrap().len(), 1);
}
