//! # News Sweep
//!
//! A resumable, browser-driven batch scraper for news sitemap URL lists.
//! Each URL list is scraped through headless Chromium into an append-only
//! success log and failure log, with failures swept again later.
//!
//! ## Features
//!
//! - Bounded-concurrency page loads over a pool of isolated browser contexts
//! - Browser restart after a configurable page budget to cap memory growth
//! - Idempotent resume: URLs already in the success log are never refetched
//! - Retry sweeps that rewrite failure logs with only the still-failing URLs
//! - Several URL lists scraped in parallel, each on its own worker thread
//! - Site extractors for The Straits Times, The Business Times, Berita Harian,
//!   The New Paper, Tamil Murasu, Lianhe Zaobao and Tabla!
//!
//! ## Usage
//!
//! ```sh
//! news_sweep --base-dir ./data/st run
//! news_sweep --base-dir ./data/st retry
//! news_sweep --base-dir ./data/st report --threshold 20 --requeue
//! news_sweep --base-dir ./data/st report --coverage
//! ```
//!
//! ## Architecture
//!
//! 1. **Scheduling**: pending lists in `unseen/` are shared out to worker threads
//! 2. **Fetching**: each batch drives one browser session through the page fetcher
//! 3. **Extraction**: rendered pages are parsed on blocking threads by the site extractor
//! 4. **Output**: records are appended to `scraped/` and `unsuccessful/`, and the
//!    finished list moves to `seen/`

use clap::Parser;
use std::error::Error;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod browser;
mod cli;
mod config;
mod error;
mod fetcher;
mod models;
mod orchestrator;
mod outputs;
mod pipeline;
mod retry;
mod scheduler;
mod scrapers;
mod session;
mod utils;

use browser::chromium::ChromiumLauncher;
use cli::{Cli, Command};
use config::SweepConfig;
use outputs::report::{BatchCoverage, coverage_report, failure_report, requeue};
use pipeline::Pipeline;
use retry::{retry_all, retry_batch};
use scheduler::{FileScheduler, FileStatus, SiteDirs};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    info!(base_dir = %args.base_dir.display(), command = ?args.command, "news_sweep starting up");

    let config = SweepConfig::load(args.config.as_deref())?.apply(&args.overrides());

    let dirs = SiteDirs::new(&args.base_dir);
    if let Err(e) = dirs.create().await {
        error!(error = %e, "Site directories are not usable (fix perms or choose a different base dir)");
        return Err(e.into());
    }

    let extractor = config.extractor()?;
    let site = extractor.name();
    let settings = config.fetch_settings(extractor.as_ref())?;
    let mut pipeline = Pipeline::new(
        ChromiumLauncher::new(config.browser.clone()),
        extractor,
        settings,
    )
    .with_summary(config.summary.clone());
    if let Some(attempts) = config.fetch_attempts {
        pipeline = pipeline.with_fetch_attempts(attempts);
    }
    info!(
        site,
        concurrency = pipeline.settings().concurrency,
        attempts = pipeline.fetch_attempts(),
        readiness = %pipeline.settings().readiness_selector,
        "Pipeline configured"
    );

    match args.command {
        Command::Run(_) => {
            let files = dirs.pending_files()?;
            if files.is_empty() {
                info!(dir = %dirs.unseen.display(), "No pending URL lists");
                return Ok(());
            }
            let scheduler =
                FileScheduler::new(pipeline, dirs, config.parallel_files, config.concurrency);
            let statuses = tokio::task::spawn_blocking(move || scheduler.run_all(&files)).await?;
            for status in &statuses {
                if let FileStatus::Failed { input, reason } = status {
                    warn!(file = %input.display(), %reason, "Left pending for the next run");
                }
            }
        }
        Command::Retry { log } => {
            let counts = match log {
                Some(path) => {
                    retry_batch(&pipeline, &path, &dirs.scraped, config.retry_concurrency).await?
                }
                None => {
                    retry_all(
                        &pipeline,
                        &dirs.unsuccessful,
                        &dirs.scraped,
                        config.retry_concurrency,
                    )
                    .await?
                }
            };
            info!(
                already_scraped = counts.already_scraped,
                retried = counts.retried,
                recovered = counts.recovered,
                still_failing = counts.still_failing,
                "Retry finished"
            );
        }
        Command::Report {
            threshold,
            requeue: requeue_batches,
            coverage,
        } => {
            if coverage {
                let report = coverage_report(
                    &[dirs.unseen.as_path(), dirs.seen.as_path()],
                    &dirs.scraped,
                    &dirs.unsuccessful,
                )
                .await?;
                println!("{}", BatchCoverage::HEADER);
                for batch in &report {
                    println!("{}", batch.row());
                }
            } else {
                let report = failure_report(&dirs.unsuccessful, threshold).await?;
                for batch in &report {
                    println!("{}\t{}", batch.input_name(), batch.failures);
                }
                if requeue_batches {
                    let moved = requeue(&report, &dirs.seen, &dirs.unseen).await?;
                    info!(count = moved.len(), "Requeued batches");
                }
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
