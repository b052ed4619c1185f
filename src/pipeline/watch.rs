// src/pipeline/watch.rs

//! Change-watch run orchestration.
//!
//! One run per target walks
//! `FETCH → EXTRACT → PERSIST_SNAPSHOT → LOAD_PREVIOUS → DIFF → (NOTIFY | SKIP) → DONE`.
//! Fetch, extract, and file errors end the run with an error before any
//! later state; a failed notification is logged and the run still succeeds.
//! The diff file is written after notifying and failing to save it only
//! logs a warning, since the new snapshot is already the next baseline.

use std::fmt;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{Config, Snapshot, Target};
use crate::pipeline::diff::DiffCalculator;
use crate::services::{Notifier, ResourceFetcher, extract, fetch_resource};
use crate::storage::SnapshotStorage;
use crate::utils::log;

/// States of a single target run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Fetch,
    Extract,
    PersistSnapshot,
    LoadPrevious,
    Diff,
    Notify,
    Skip,
    Done,
}

impl RunState {
    /// Position in the step log (NOTIFY and SKIP share a slot).
    fn step(&self) -> usize {
        match self {
            RunState::Fetch => 1,
            RunState::Extract => 2,
            RunState::PersistSnapshot => 3,
            RunState::LoadPrevious => 4,
            RunState::Diff => 5,
            RunState::Notify | RunState::Skip => 6,
            RunState::Done => 7,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Fetch => "FETCH",
            RunState::Extract => "EXTRACT",
            RunState::PersistSnapshot => "PERSIST_SNAPSHOT",
            RunState::LoadPrevious => "LOAD_PREVIOUS",
            RunState::Diff => "DIFF",
            RunState::Notify => "NOTIFY",
            RunState::Skip => "SKIP",
            RunState::Done => "DONE",
        };
        f.write_str(label)
    }
}

const TOTAL_STEPS: usize = 6;

fn enter(state: RunState, target: &str, detail: &str) {
    if state == RunState::Done {
        ::log::debug!("[{}] {}", target, state);
    } else {
        log::step(state.step(), TOTAL_STEPS, &format!("{} {} {}", state, target, detail));
    }
}

/// Result of trying to deliver a change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    Sent,
    /// Delivery failed; the run still counts as a success
    Failed(String),
}

/// What a successful run concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// First capture; stored without notifying
    Baseline,
    /// Identical to the previous capture
    Unchanged,
    /// Content changed and a notification was attempted
    Changed {
        hunks: usize,
        added: usize,
        removed: usize,
        notification: NotificationStatus,
    },
}

/// Report of one target run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: String,
    pub outcome: RunOutcome,
    pub snapshot_location: String,
    pub diff_location: Option<String>,
    /// SHA-256 of the captured snapshot text
    pub digest: String,
}

/// Everything a run needs, constructed once at startup.
pub struct WatchContext<'a> {
    pub config: &'a Config,
    pub fetcher: &'a dyn ResourceFetcher,
    pub storage: &'a dyn SnapshotStorage,
    pub notifier: &'a Notifier,
}

/// Run the full workflow for one target.
pub async fn run_target(ctx: &WatchContext<'_>, target: &Target) -> Result<RunReport> {
    let name = target.name.as_str();

    enter(RunState::Fetch, name, target.locator().entry_url());
    let fetched = fetch_resource(ctx.fetcher, &target.locator()).await?;

    enter(RunState::Extract, name, &format!("{} bytes as {}", fetched.bytes.len(), target.kind));
    let lines = extract::extract_target(&fetched.bytes, target)?;

    enter(RunState::PersistSnapshot, name, &format!("{} lines", lines.len()));
    let snapshot = Snapshot::capture(name, lines);
    // Raw archive before the snapshot; a snapshot on disk is the next baseline
    if ctx.config.storage.keep_raw {
        ctx.storage
            .write_raw(name, &snapshot.captured_at, target.kind, &fetched.bytes)
            .await?;
    }
    let snapshot_location = ctx.storage.write_snapshot(&snapshot).await?;

    let mut report = RunReport {
        target: name.to_string(),
        outcome: RunOutcome::Baseline,
        snapshot_location,
        diff_location: None,
        digest: snapshot.digest(),
    };

    enter(RunState::LoadPrevious, name, "");
    let previous = ctx
        .storage
        .latest_before(name, &snapshot.captured_at)
        .await?;

    let (old_lines, from_label) = match &previous {
        Some(prev) => (prev.lines.as_slice(), format!("{} ({})", name, prev.stamp())),
        None if ctx.config.diff.notify_on_baseline => {
            ::log::info!("No previous snapshot of {}; diffing against empty baseline", name);
            (&[][..], format!("{} (baseline)", name))
        }
        None => {
            ::log::info!("No previous snapshot of {}; baseline established", name);
            enter(RunState::Skip, name, "baseline");
            enter(RunState::Done, name, "");
            return Ok(report);
        }
    };

    enter(RunState::Diff, name, "");
    let diff = DiffCalculator::with_context(ctx.config.diff.context_lines)
        .calculate(old_lines, &snapshot.lines);

    if diff.is_empty() {
        enter(RunState::Skip, name, "no changes");
        report.outcome = RunOutcome::Unchanged;
        enter(RunState::Done, name, "");
        return Ok(report);
    }

    let to_label = format!("{} ({})", name, snapshot.stamp());
    let text = diff.render(&from_label, &to_label);
    ::log::info!(
        "{}: {} hunks, +{} -{} lines",
        name,
        diff.hunks.len(),
        diff.added_count(),
        diff.removed_count()
    );

    enter(RunState::Notify, name, ctx.notifier.recipient());
    let notification = deliver(ctx.notifier, name, &text, &snapshot).await?;

    report.diff_location = match ctx
        .storage
        .write_diff(name, &snapshot.captured_at, &text)
        .await
    {
        Ok(location) => Some(location),
        Err(e) => {
            ::log::warn!("Diff for {} not saved: {}", name, e);
            None
        }
    };

    report.outcome = RunOutcome::Changed {
        hunks: diff.hunks.len(),
        added: diff.added_count(),
        removed: diff.removed_count(),
        notification,
    };
    enter(RunState::Done, name, "");
    Ok(report)
}

/// Send once; downgrade delivery failures to a warning.
async fn deliver(
    notifier: &Notifier,
    name: &str,
    text: &str,
    snapshot: &Snapshot,
) -> Result<NotificationStatus> {
    match notifier.notify(name, text, &snapshot.captured_at).await {
        Ok(()) => Ok(NotificationStatus::Sent),
        Err(e) if !e.is_fatal() => {
            ::log::warn!("Email not sent for {}: {}", name, e);
            Ok(NotificationStatus::Failed(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Reports and failures of a multi-target run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<RunReport>,
    pub failures: Vec<(String, AppError)>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run every given target in order, continuing past failures.
pub async fn run_all(ctx: &WatchContext<'_>, targets: &[Target]) -> RunSummary {
    log::header(&format!("Watching {} targets", targets.len()));

    let mut summary = RunSummary::default();
    for target in targets {
        match run_target(ctx, target).await {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                ::log::error!("Run for {} failed: {}", target.name, e);
                summary.failures.push((target.name.clone(), e));
            }
        }
        log::separator();
    }

    let count = |pred: fn(&RunOutcome) -> bool| {
        summary
            .reports
            .iter()
            .filter(|r| pred(&r.outcome))
            .count()
            .to_string()
    };
    log::summary(
        "Watch run",
        &[
            ("Baseline", count(|o| matches!(o, RunOutcome::Baseline))),
            ("Unchanged", count(|o| matches!(o, RunOutcome::Unchanged))),
            ("Changed", count(|o| matches!(o, RunOutcome::Changed { .. }))),
            ("Failed", summary.failures.len().to_string()),
        ],
    );

    summary
}

/// Result of comparing two snapshot files.
#[derive(Debug, Clone)]
pub struct CompareReport {
    pub text: String,
    pub hunks: usize,
    pub notification: Option<NotificationStatus>,
}

/// Diff two snapshot files at caller-specified paths.
///
/// The diff is labelled `Old {label}` / `New {label}`, optionally written to
/// `output`, and optionally sent through `notifier` when non-empty.
pub async fn compare_files(
    old_path: &Path,
    new_path: &Path,
    label: &str,
    context: usize,
    output: Option<&Path>,
    notifier: Option<&Notifier>,
) -> Result<CompareReport> {
    let old = Snapshot::read_from(label, old_path)?;
    let new = Snapshot::read_from(label, new_path)?;

    let diff = DiffCalculator::with_context(context).calculate(&old.lines, &new.lines);
    let text = diff.render(&format!("Old {label}"), &format!("New {label}"));

    if let Some(path) = output {
        std::fs::write(path, &text).map_err(|e| AppError::file_access(path, e))?;
        ::log::info!("Diff written to {}", path.display());
    }

    let notification = match notifier {
        Some(notifier) if diff.has_changes() => Some(deliver(notifier, label, &text, &new).await?),
        _ => None,
    };

    Ok(CompareReport {
        text,
        hunks: diff.hunks.len(),
        notification,
    })
}
