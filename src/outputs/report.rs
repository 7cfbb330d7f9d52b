//! Failure report over a failure-log directory, with optional requeue, and
//! a coverage audit of inputs against their logs.
//!
//! Batches whose failure logs hold more than `threshold` entries are listed
//! by their input file name (`<batch_key>.txt`). Requeueing renames each
//! listed input from `seen/` back to `unseen/` so the next run resumes it.
//!
//! The coverage audit counts, per input list, the URLs found in the success
//! log, in the failure log, in neither, and the repeats within each file.

use super::jsonl::{failure_log_path, load_failures, success_log_path, success_urls};
use crate::error::ScrapeError;
use crate::utils::{ERRORS_SUFFIX, batch_key_from_path};
use itertools::Itertools;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailures {
    pub batch_key: String,
    pub failures: usize,
}

impl BatchFailures {
    pub fn input_name(&self) -> String {
        format!("{}.txt", self.batch_key)
    }
}

/// Every file under `dir` whose name ends with `suffix`, sorted by name.
async fn files_ending_with(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, ScrapeError> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| ScrapeError::io(dir, e))?;
    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ScrapeError::io(dir, e))?
    {
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix));
        if matches {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Every `*_errors.jsonl` under `dir`, sorted by name.
pub async fn failure_logs(dir: &Path) -> Result<Vec<PathBuf>, ScrapeError> {
    files_ending_with(dir, &format!("{ERRORS_SUFFIX}.jsonl")).await
}

/// Batches with more than `threshold` recorded failures.
#[instrument(level = "info", skip_all, fields(dir = %err_dir.display(), threshold))]
pub async fn failure_report(
    err_dir: &Path,
    threshold: usize,
) -> Result<Vec<BatchFailures>, ScrapeError> {
    let mut over = Vec::new();
    for log in failure_logs(err_dir).await? {
        let Some(batch_key) = batch_key_from_path(&log) else {
            continue;
        };
        let failures = load_failures(&log).await?.len();
        if failures > threshold {
            over.push(BatchFailures {
                batch_key,
                failures,
            });
        }
    }
    info!(batches = over.len(), "Failure report complete");
    Ok(over)
}

/// Move each batch's input from `seen` back into `unseen`.
///
/// Returns the inputs that were moved; batches whose input is missing from
/// `seen` are skipped with a warning.
pub async fn requeue(
    batches: &[BatchFailures],
    seen: &Path,
    unseen: &Path,
) -> Result<Vec<PathBuf>, ScrapeError> {
    let mut moved = Vec::new();
    for batch in batches {
        let from = seen.join(batch.input_name());
        let to = unseen.join(batch.input_name());
        if !fs::try_exists(&from).await.unwrap_or(false) {
            warn!(path = %from.display(), "Input not in seen/; cannot requeue");
            continue;
        }
        fs::rename(&from, &to)
            .await
            .map_err(|e| ScrapeError::io(&from, e))?;
        info!(batch = %batch.batch_key, failures = batch.failures, "Requeued batch");
        moved.push(to);
    }
    Ok(moved)
}

/// How far one input list is accounted for by its two logs.
///
/// `scraped` and `failed` count log lines, so repeats show up there and in
/// the matching `*_duplicates` field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchCoverage {
    pub batch_key: String,
    /// Distinct URLs in the input list.
    pub input_urls: usize,
    pub scraped: usize,
    pub failed: usize,
    /// Input URLs in neither log.
    pub unaccounted: usize,
    pub input_duplicates: usize,
    pub scraped_duplicates: usize,
    pub failed_duplicates: usize,
}

impl BatchCoverage {
    pub const HEADER: &'static str =
        "batch\tinput\tscraped\tfailed\tunaccounted\tdup_input\tdup_scraped\tdup_failed";

    pub fn row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.batch_key,
            self.input_urls,
            self.scraped,
            self.failed,
            self.unaccounted,
            self.input_duplicates,
            self.scraped_duplicates,
            self.failed_duplicates
        )
    }
}

fn repeats(urls: &[String]) -> usize {
    urls.len() - urls.iter().unique().count()
}

/// Audit every `*.txt` input under `input_dirs` against its logs in
/// `out_dir` and `err_dir`. Missing logs count as empty.
#[instrument(level = "info", skip_all)]
pub async fn coverage_report(
    input_dirs: &[&Path],
    out_dir: &Path,
    err_dir: &Path,
) -> Result<Vec<BatchCoverage>, ScrapeError> {
    let mut report = Vec::new();
    for dir in input_dirs {
        for input in files_ending_with(dir, ".txt").await? {
            let Some(batch_key) = batch_key_from_path(&input) else {
                continue;
            };
            let raw = fs::read_to_string(&input)
                .await
                .map_err(|e| ScrapeError::io(&input, e))?;
            let listed: Vec<String> = raw
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            let scraped = success_urls(&success_log_path(out_dir, &batch_key)).await?;
            let failed: Vec<String> = load_failures(&failure_log_path(err_dir, &batch_key))
                .await?
                .into_iter()
                .map(|f| f.url)
                .collect();

            let accounted: HashSet<&String> = scraped.iter().chain(&failed).collect();
            let distinct: HashSet<&String> = listed.iter().collect();
            let coverage = BatchCoverage {
                input_urls: distinct.len(),
                scraped: scraped.len(),
                failed: failed.len(),
                unaccounted: distinct.iter().filter(|u| !accounted.contains(*u)).count(),
                input_duplicates: repeats(&listed),
                scraped_duplicates: repeats(&scraped),
                failed_duplicates: repeats(&failed),
                batch_key,
            };
            debug!(?coverage, "Audited batch");
            report.push(coverage);
        }
    }
    report.sort_by(|a, b| a.batch_key.cmp(&b.batch_key));
    let incomplete = report.iter().filter(|c| c.unaccounted > 0).count();
    info!(batches = report.len(), incomplete, "Coverage audit complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: &str = "[\"ERROR\",\"https://x\",\"m\",\"t\"]\n";

    #[tokio::test]
    async fn test_report_lists_batches_over_threshold() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a_errors.jsonl"), ROW.repeat(3)).await.unwrap();
        fs::write(tmp.path().join("b_errors.jsonl"), ROW).await.unwrap();
        fs::write(tmp.path().join("c.jsonl"), ROW.repeat(9)).await.unwrap();

        let report = failure_report(tmp.path(), 1).await.unwrap();
        assert_eq!(
            report,
            vec![BatchFailures {
                batch_key: "a".into(),
                failures: 3
            }]
        );
        assert_eq!(report[0].input_name(), "a.txt");
    }

    #[tokio::test]
    async fn test_requeue_moves_seen_back_to_unseen() {
        let tmp = tempfile::tempdir().unwrap();
        let seen = tmp.path().join("seen");
        let unseen = tmp.path().join("unseen");
        fs::create_dir_all(&seen).await.unwrap();
        fs::create_dir_all(&unseen).await.unwrap();
        fs::write(seen.join("a.txt"), "https://x\n").await.unwrap();

        let batches = vec![
            BatchFailures {
                batch_key: "a".into(),
                failures: 2,
            },
            BatchFailures {
                batch_key: "gone".into(),
                failures: 5,
            },
        ];
        let moved = requeue(&batches, &seen, &unseen).await.unwrap();
        assert_eq!(moved, vec![unseen.join("a.txt")]);
        assert!(!seen.join("a.txt").exists());
        assert!(unseen.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_coverage_counts_gaps_and_repeats() {
        let tmp = tempfile::tempdir().unwrap();
        let seen = tmp.path().join("seen");
        let unseen = tmp.path().join("unseen");
        let out = tmp.path().join("scraped");
        let err = tmp.path().join("unsuccessful");
        for d in [&seen, &unseen, &out, &err] {
            fs::create_dir_all(d).await.unwrap();
        }
        fs::write(seen.join("st_2024.txt"), "https://x/a\nhttps://x/b\n\nhttps://x/c\nhttps://x/a\nhttps://x/d\n")
            .await
            .unwrap();
        fs::write(
            out.join("st_2024.jsonl"),
            "{\"article_url\":\"https://x/a\"}\n{\"article_url\":\"https://x/b\"}\n{\"article_url\":\"https://x/b\"}\nnot json\n",
        )
        .await
        .unwrap();
        fs::write(err.join("st_2024_errors.jsonl"), "[\"ERROR\",\"https://x/c\",\"m\",\"t\"]\n")
            .await
            .unwrap();
        fs::write(unseen.join("pending.txt"), "https://x/z\n").await.unwrap();

        let report = coverage_report(&[unseen.as_path(), seen.as_path()], &out, &err).await.unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(
            report[0],
            BatchCoverage {
                batch_key: "pending".into(),
                input_urls: 1,
                unaccounted: 1,
                ..BatchCoverage::default()
            }
        );
        assert_eq!(
            report[1],
            BatchCoverage {
                batch_key: "st_2024".into(),
                input_urls: 4,
                scraped: 3,
                failed: 1,
                unaccounted: 1,
                input_duplicates: 1,
                scraped_duplicates: 1,
                failed_duplicates: 0,
            }
        );
        assert_eq!(report[1].row(), "st_2024\t4\t3\t1\t1\t1\t1\t0");
        assert_eq!(BatchCoverage::HEADER.split('\t').count(), 8);
    }
}
