//! Pipeline entry points for watcher operations.
//!
//! - `run_target` / `run_all`: fetch, snapshot, diff, and notify
//! - `compare_files`: diff two snapshot files at explicit paths

pub mod diff;
pub mod watch;

pub use diff::{DiffCalculator, DiffResult, Hunk, LineKind, calculate_diff};
pub use watch::{
    CompareReport, NotificationStatus, RunOutcome, RunReport, RunState, RunSummary, WatchContext,
    compare_files, run_all, run_target,
};
