//! Batch orchestrator: one URL list in, one success log and one failure
//! log out.
//!
//! # Flow
//!
//! 1. Read the URL list (blank lines ignored). An unreadable list fails the
//!    batch.
//! 2. Open both logs, creating them if absent, so a processed batch always
//!    has two logs.
//! 3. Drop URLs already present in the success log.
//! 4. Launch the browser and submit every remaining URL at once; the page
//!    fetcher's slots are the only throttle.
//! 5. Write each outcome as soon as it completes (completion order, not
//!    input order), flushing after every record.
//!
//! Killing a run mid-batch loses only the URLs still in flight; running the
//! same batch again picks up where it stopped.

use crate::browser::Launcher;
use crate::error::ScrapeError;
use crate::models::ScrapeOutcome;
use crate::outputs::jsonl::{OutputLog, failure_log_path, load_success_urls, success_log_path};
use crate::pipeline::{ArticleScraper, Pipeline};
use crate::utils::batch_key_from_path;
use futures::stream::{FuturesUnordered, StreamExt};
use itertools::Itertools;
use std::path::Path;
use std::time::Instant;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Per-batch tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub skipped: usize,
    pub ok: usize,
    pub failed: usize,
}

/// Run one batch and return its key (the input file stem).
#[instrument(level = "info", skip(pipeline), fields(batch))]
pub async fn run<L: Launcher + Clone>(
    pipeline: &Pipeline<L>,
    url_list: &Path,
    out_dir: &Path,
    err_dir: &Path,
    concurrency: usize,
) -> Result<String, ScrapeError> {
    let t0 = Instant::now();
    let batch_key = batch_key_from_path(url_list).ok_or_else(|| {
        ScrapeError::Config(format!("cannot derive batch key from {}", url_list.display()))
    })?;
    tracing::Span::current().record("batch", batch_key.as_str());

    let urls = read_url_list(url_list).await?;
    let success_path = success_log_path(out_dir, &batch_key);
    let mut ok_log = OutputLog::open(&success_path).await?;
    let mut err_log = OutputLog::open(failure_log_path(err_dir, &batch_key)).await?;

    let done = load_success_urls(&success_path).await?;
    let total = urls.len();
    let pending: Vec<String> = urls.into_iter().filter(|u| !done.contains(u)).collect();
    let skipped = total - pending.len();

    if pending.is_empty() {
        info!(already_done = skipped, "Nothing pending in batch");
        return Ok(batch_key);
    }
    info!(pending = pending.len(), already_done = skipped, "Starting batch");

    let scraper = pipeline.start(concurrency).await?;
    let result = drain(&scraper, &pending, &mut ok_log, &mut err_log).await;
    let recycles = scraper.fetcher().recycles();
    scraper.shutdown().await;
    let counts = BatchCounts {
        skipped,
        ..result?
    };

    info!(
        ok = counts.ok,
        errors = counts.failed,
        skipped = counts.skipped,
        recycles,
        success_log = %ok_log.path().display(),
        elapsed_ms = t0.elapsed().as_millis(),
        "Batch complete"
    );
    Ok(batch_key)
}

/// Distinct non-blank URLs in file order.
async fn read_url_list(path: &Path) -> Result<Vec<String>, ScrapeError> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| ScrapeError::io(path, e))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unique()
        .map(str::to_string)
        .collect())
}

async fn drain<L: Launcher>(
    scraper: &ArticleScraper<L>,
    pending: &[String],
    ok_log: &mut OutputLog,
    err_log: &mut OutputLog,
) -> Result<BatchCounts, ScrapeError> {
    let mut in_flight: FuturesUnordered<_> =
        pending.iter().map(|url| scraper.scrape(url)).collect();
    let mut counts = BatchCounts::default();

    while let Some(outcome) = in_flight.next().await {
        match outcome {
            ScrapeOutcome::Success(record) => {
                ok_log.append(&record).await?;
                counts.ok += 1;
                debug!(url = %record.url, "Saved article");
            }
            ScrapeOutcome::Failure(failure) => {
                err_log.append(&failure).await?;
                counts.failed += 1;
                warn!(url = %failure.url, error = %failure.error_message, "Recorded failure");
            }
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::scripted::{Script, ScriptStats, ScriptedLauncher, article_html};
    use crate::fetcher::FetchSettings;
    use crate::outputs::jsonl::load_failures;
    use crate::scrapers::SiteKind;
    use crate::scrapers::common::ImageFilter;
    use std::path::PathBuf;

    struct Dirs {
        _tmp: tempfile::TempDir,
        input: PathBuf,
        out: PathBuf,
        err: PathBuf,
    }

    async fn dirs(name: &str, urls: &str) -> Dirs {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("scraped");
        let err = tmp.path().join("unsuccessful");
        fs::create_dir_all(&out).await.unwrap();
        fs::create_dir_all(&err).await.unwrap();
        let input = tmp.path().join(name);
        fs::write(&input, urls).await.unwrap();
        Dirs {
            _tmp: tmp,
            input,
            out,
            err,
        }
    }

    fn pipeline(launcher: ScriptedLauncher) -> Pipeline<ScriptedLauncher> {
        Pipeline::new(
            launcher,
            SiteKind::StraitsTimes.extractor(ImageFilter::default()),
            FetchSettings::for_tests(3),
        )
    }

    fn three_urls() -> ScriptedLauncher {
        ScriptedLauncher::new([
            ("https://st/1".to_string(), Script::Html(article_html("One", "a"))),
            ("https://st/2".to_string(), Script::Hang),
            ("https://st/3".to_string(), Script::Html(article_html("Three", "c"))),
        ])
    }

    async fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .await
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_partial_failure_batch() {
        let d = dirs("st_2024_01.txt", "https://st/1\nhttps://st/2\n\nhttps://st/3\n").await;
        let key = run(&pipeline(three_urls()), &d.input, &d.out, &d.err, 3)
            .await
            .unwrap();
        assert_eq!(key, "st_2024_01");

        let ok = lines(&d.out.join("st_2024_01.jsonl")).await;
        assert_eq!(ok.len(), 2);
        assert!(ok.iter().all(|l| !l.contains("https://st/2")));

        let failures = load_failures(&d.err.join("st_2024_01_errors.jsonl")).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].url, "https://st/2");
    }

    #[tokio::test]
    async fn test_rerun_does_not_refetch_successes() {
        let d = dirs("st_2024_02.txt", "https://st/1\nhttps://st/2\nhttps://st/3\n").await;
        let launcher = three_urls();
        let stats = launcher.stats.clone();
        let p = pipeline(launcher);

        run(&p, &d.input, &d.out, &d.err, 2).await.unwrap();
        run(&p, &d.input, &d.out, &d.err, 2).await.unwrap();

        assert_eq!(stats.loads_of("https://st/1"), 1);
        assert_eq!(stats.loads_of("https://st/3"), 1);
        assert_eq!(lines(&d.out.join("st_2024_02.jsonl")).await.len(), 2);
        // Still failing, so retried on each run (2 attempts each).
        assert_eq!(stats.loads_of("https://st/2"), 4);
    }

    #[tokio::test]
    async fn test_fully_done_batch_never_launches() {
        let d = dirs("done.txt", "https://st/1\n").await;
        fs::write(
            d.out.join("done.jsonl"),
            "{\"article_url\":\"https://st/1\",\"content\":\"\"}\n",
        )
        .await
        .unwrap();
        let launcher = three_urls();
        let stats = launcher.stats.clone();

        run(&pipeline(launcher), &d.input, &d.out, &d.err, 2).await.unwrap();
        assert_eq!(ScriptStats::get(&stats.launches), 0);
    }

    #[tokio::test]
    async fn test_empty_input_is_trivially_complete() {
        let d = dirs("empty.txt", "\n   \n").await;
        let launcher = ScriptedLauncher::failing();
        let key = run(&pipeline(launcher), &d.input, &d.out, &d.err, 2).await.unwrap();
        assert_eq!(key, "empty");
        assert!(d.out.join("empty.jsonl").exists());
        assert!(d.err.join("empty_errors.jsonl").exists());
    }

    #[tokio::test]
    async fn test_unreadable_input_fails_batch() {
        let d = dirs("x.txt", "").await;
        let missing = d.input.with_file_name("missing.txt");
        let err = run(&pipeline(three_urls()), &missing, &d.out, &d.err, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Io { .. }));
    }

    #[tokio::test]
    async fn test_launch_failure_fails_batch() {
        let d = dirs("y.txt", "https://st/1\n").await;
        let err = run(&pipeline(ScriptedLauncher::failing()), &d.input, &d.out, &d.err, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Fetch(_)));
    }
}
