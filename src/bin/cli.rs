//! criteria-watch CLI
//!
//! Local execution entry point. Intended to be run from cron or a CI
//! schedule; exits non-zero when any target fails.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use criteria_watch::{
    error::{AppError, Result},
    models::{Config, ContentKind, Locator, format_stamp},
    pipeline::{self, RunOutcome, WatchContext},
    services::{HttpFetcher, Notifier, extract, fetch_resource},
    storage::{LocalStorage, SnapshotStorage},
};

/// criteria-watch - Accreditation Criteria Change Watcher
#[derive(Parser, Debug)]
#[command(
    name = "criteria-watch",
    version,
    about = "Detect and report changes in published accreditation criteria"
)]
struct Cli {
    /// Path to storage directory containing config.toml and snapshots
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every target, snapshot it, and report changes
    Watch {
        /// Only run the named targets (repeatable)
        #[arg(short, long = "target")]
        targets: Vec<String>,
    },

    /// Fetch a single resource and print its extracted text
    Fetch {
        url: String,

        /// Content kind (pdf or html); detected from the download when omitted
        #[arg(long)]
        kind: Option<ContentKind>,

        /// Follow the first anchor on the page whose text or class matches
        #[arg(long)]
        link: Option<String>,

        /// Write the text here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Diff two snapshot files
    Diff {
        old: PathBuf,
        new: PathBuf,

        /// Label used in the diff headers and email
        #[arg(long, default_value = "Criteria")]
        label: String,

        /// Unchanged lines around each change (default from config)
        #[arg(short, long)]
        context: Option<usize>,

        /// Write the diff here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Email the diff when non-empty
        #[arg(long)]
        notify: bool,
    },

    /// Validate configuration
    Validate,

    /// Show targets and their stored snapshots
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("criteria-watch starting...");

    let config_path = cli.storage_dir.join("config.toml");
    let mut config = Config::load_or_default(&config_path)?;
    config.apply_env();

    log::debug!("Configuration: {:?}", config);

    let storage = LocalStorage::new(&cli.storage_dir);

    match cli.command {
        Command::Watch { targets } => {
            config.validate()?;

            let selected = if targets.is_empty() {
                config.targets.clone()
            } else {
                targets
                    .iter()
                    .map(|name| {
                        config
                            .target(name)
                            .cloned()
                            .ok_or_else(|| AppError::config(format!("Unknown target '{name}'")))
                    })
                    .collect::<Result<Vec<_>>>()?
            };

            let fetcher = HttpFetcher::new(&config.fetcher)?;
            let notifier = Notifier::from_config(&config)?;
            let ctx = WatchContext {
                config: &config,
                fetcher: &fetcher,
                storage: &storage,
                notifier: &notifier,
            };

            let summary = pipeline::run_all(&ctx, &selected).await;
            for report in &summary.reports {
                match &report.outcome {
                    RunOutcome::Changed { hunks, .. } => log::info!(
                        "{}: {} hunks, diff at {}",
                        report.target,
                        hunks,
                        report.diff_location.as_deref().unwrap_or("-")
                    ),
                    other => log::debug!("{}: {:?}", report.target, other),
                }
            }

            if !summary.is_success() {
                let names: Vec<_> = summary.failures.iter().map(|(n, _)| n.as_str()).collect();
                return Err(AppError::validation(format!(
                    "{} of {} targets failed: {}",
                    summary.failures.len(),
                    selected.len(),
                    names.join(", ")
                )));
            }
        }

        Command::Fetch {
            url,
            kind,
            link,
            output,
        } => {
            let locator = match link {
                Some(selector) => Locator::Indirect {
                    page_url: url,
                    selector,
                },
                None => Locator::Direct(url),
            };

            let fetcher = HttpFetcher::new(&config.fetcher)?;
            let fetched = fetch_resource(&fetcher, &locator).await?;
            let kind = kind.unwrap_or_else(|| fetched.kind());
            log::info!(
                "Fetched {} bytes from {} as {}",
                fetched.bytes.len(),
                fetched.url,
                kind
            );

            let lines = extract::extract(&fetched.bytes, kind)?;
            let text: String = lines.iter().map(|l| format!("{l}\n")).collect();

            match output {
                Some(path) => {
                    std::fs::write(&path, &text).map_err(|e| AppError::file_access(&path, e))?;
                    log::info!("{} lines written to {}", lines.len(), path.display());
                }
                None => print!("{text}"),
            }
        }

        Command::Diff {
            old,
            new,
            label,
            context,
            output,
            notify,
        } => {
            let notifier = if notify {
                Some(Notifier::from_config(&config)?)
            } else {
                None
            };
            let context = context.unwrap_or(config.diff.context_lines);

            let report = pipeline::compare_files(
                &old,
                &new,
                &label,
                context,
                output.as_deref(),
                notifier.as_ref(),
            )
            .await?;

            if report.hunks == 0 {
                log::info!("No differences found.");
            } else if output.is_none() {
                print!("{}", report.text);
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} targets, {:?} transport)",
                config.targets.len(),
                config.notify.transport
            );

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());
            log::info!(
                "Config: {}",
                if config_path.exists() {
                    "exists"
                } else {
                    "not found (using defaults)"
                }
            );

            for target in &config.targets {
                let stamps = storage.list_snapshots(&target.name).await?;
                match stamps.last() {
                    Some(latest) => log::info!(
                        "{} [{}]: {} snapshots, latest {}",
                        target.name,
                        target.kind,
                        stamps.len(),
                        format_stamp(latest)
                    ),
                    None => log::info!("{} [{}]: no snapshot yet", target.name, target.kind),
                }
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
