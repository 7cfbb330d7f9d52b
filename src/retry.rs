//! Retry sweeper: re-scrape the URLs in a failure log.
//!
//! Successes are appended to the batch's success log as they complete.
//! Once every entry has been tried, the failure log is rewritten with only
//! the entries that failed again, each carrying its latest error.
//!
//! Entries whose URL already made it into the success log (a later batch
//! run got it) are dropped without refetching. A URL listed more than once
//! is fetched once and keeps the position of its first entry.
//!
//! The rewrite happens after the whole sweep. A crash between loading the
//! log and rewriting it leaves the old log in place (and any successes
//! already appended), so the next sweep simply retries those URLs again.

use crate::browser::Launcher;
use crate::error::ScrapeError;
use crate::models::{FailureRecord, ScrapeOutcome};
use crate::outputs::jsonl::{
    OutputLog, load_failures, load_success_urls, overwrite_failures, success_log_path,
};
use crate::outputs::report::failure_logs;
use crate::pipeline::Pipeline;
use crate::utils::batch_key_from_path;
use futures::stream::{FuturesUnordered, StreamExt};
use itertools::Itertools;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of sweeping one failure log (or a directory of them).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepCounts {
    pub already_scraped: usize,
    pub retried: usize,
    pub recovered: usize,
    pub still_failing: usize,
}

impl std::ops::AddAssign for SweepCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.already_scraped += rhs.already_scraped;
        self.retried += rhs.retried;
        self.recovered += rhs.recovered;
        self.still_failing += rhs.still_failing;
    }
}

/// Sweep one `<batch>_errors.jsonl`.
///
/// A log with no valid entries is left untouched and no browser is launched.
#[instrument(level = "info", skip(pipeline), fields(batch))]
pub async fn retry_batch<L: Launcher + Clone>(
    pipeline: &Pipeline<L>,
    failure_log: &Path,
    out_dir: &Path,
    concurrency: usize,
) -> Result<SweepCounts, ScrapeError> {
    let batch_key = batch_key_from_path(failure_log).ok_or_else(|| {
        ScrapeError::Config(format!("cannot derive batch key from {}", failure_log.display()))
    })?;
    tracing::Span::current().record("batch", batch_key.as_str());

    let loaded = load_failures(failure_log).await?;
    if loaded.is_empty() {
        info!("No failure entries to retry");
        return Ok(SweepCounts::default());
    }
    let listed = loaded.len();
    let loaded: Vec<FailureRecord> = loaded.into_iter().unique_by(|f| f.url.clone()).collect();
    if loaded.len() < listed {
        debug!(duplicates = listed - loaded.len(), "Collapsed repeated failure entries");
    }

    let success_path = success_log_path(out_dir, &batch_key);
    let done = load_success_urls(&success_path).await?;
    let (scraped, entries): (Vec<_>, Vec<_>) =
        loaded.into_iter().partition(|f| done.contains(&f.url));
    if entries.is_empty() {
        info!(already_scraped = scraped.len(), "Every failed URL has since succeeded");
        overwrite_failures(failure_log, &[]).await?;
        return Ok(SweepCounts {
            already_scraped: scraped.len(),
            ..SweepCounts::default()
        });
    }
    info!(
        entries = entries.len(),
        already_scraped = scraped.len(),
        "Retrying failed URLs"
    );

    let mut ok_log = OutputLog::open(&success_path).await?;
    let scraper = pipeline.start(concurrency).await?;

    let mut in_flight: FuturesUnordered<_> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let scraper = &scraper;
            async move { (i, scraper.scrape(&entry.url).await) }
        })
        .collect();

    let mut still_failing: Vec<(usize, FailureRecord)> = Vec::new();
    let mut write_error = None;
    while let Some((i, outcome)) = in_flight.next().await {
        match outcome {
            ScrapeOutcome::Success(record) => {
                if let Err(e) = ok_log.append(&record).await {
                    write_error = Some(e);
                    break;
                }
                info!(url = %record.url, "Recovered on retry");
            }
            ScrapeOutcome::Failure(failure) => {
                warn!(url = %failure.url, error = %failure.error_message, "Still failing");
                still_failing.push((i, failure));
            }
        }
    }
    drop(in_flight);
    scraper.shutdown().await;
    if let Some(e) = write_error {
        return Err(e);
    }

    still_failing.sort_by_key(|(i, _)| *i);
    let remaining: Vec<FailureRecord> = still_failing.into_iter().map(|(_, f)| f).collect();
    overwrite_failures(failure_log, &remaining).await?;

    let counts = SweepCounts {
        already_scraped: scraped.len(),
        retried: entries.len(),
        recovered: entries.len() - remaining.len(),
        still_failing: remaining.len(),
    };
    info!(
        recovered = counts.recovered,
        still_failing = counts.still_failing,
        "Retry sweep complete"
    );
    Ok(counts)
}

/// Sweep every failure log under `err_dir`. A log that cannot be swept is
/// logged and skipped.
#[instrument(level = "info", skip(pipeline))]
pub async fn retry_all<L: Launcher + Clone>(
    pipeline: &Pipeline<L>,
    err_dir: &Path,
    out_dir: &Path,
    concurrency: usize,
) -> Result<SweepCounts, ScrapeError> {
    let mut total = SweepCounts::default();
    for log in failure_logs(err_dir).await? {
        match retry_batch(pipeline, &log, out_dir, concurrency).await {
            Ok(counts) => total += counts,
            Err(e) => error!(path = %log.display(), error = %e, "Retry sweep failed for log"),
        }
    }
    Ok(total)
}
