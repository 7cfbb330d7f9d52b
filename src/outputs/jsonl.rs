//! Newline-delimited JSON logs.
//!
//! Success logs hold one [`ArticleRecord`](crate::models::ArticleRecord)
//! object per line; failure logs hold one `["ERROR", url, message, trace]`
//! array per line. Both are append-only while a batch runs. The failure log
//! is the one file ever rewritten, by the retry sweep, via
//! [`overwrite_failures`].
//!
//! Readers are lenient: a line that does not parse is skipped with a
//! warning and never fails the caller.

use crate::error::ScrapeError;
use crate::models::FailureRecord;
use crate::utils::{ERRORS_SUFFIX, truncate_for_log};
use serde::Serialize;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// `<out_dir>/<batch_key>.jsonl`
pub fn success_log_path(out_dir: &Path, batch_key: &str) -> PathBuf {
    out_dir.join(format!("{batch_key}.jsonl"))
}

/// `<err_dir>/<batch_key>_errors.jsonl`
pub fn failure_log_path(err_dir: &Path, batch_key: &str) -> PathBuf {
    err_dir.join(format!("{batch_key}{ERRORS_SUFFIX}.jsonl"))
}

/// An append-only log file. Every record is flushed as soon as it is written.
#[derive(Debug)]
pub struct OutputLog {
    path: PathBuf,
    file: File,
}

impl OutputLog {
    /// Open `path` for appending, creating it (empty) if absent.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ScrapeError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| ScrapeError::io(&path, e))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append<T: Serialize>(&mut self, record: &T) -> Result<(), ScrapeError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .await
            .map_err(|e| ScrapeError::io(&self.path, e))?;
        self.file
            .flush()
            .await
            .map_err(|e| ScrapeError::io(&self.path, e))
    }
}

/// Lines of `path`, or nothing if it does not exist yet.
async fn read_lines(path: &Path) -> Result<Vec<String>, ScrapeError> {
    let bytes = match fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ScrapeError::io(path, e)),
    };
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// URLs recorded in a success log, in file order and with repeats.
///
/// Accepts `article_url` or `url` as the key; lines with neither are skipped.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn success_urls(path: &Path) -> Result<Vec<String>, ScrapeError> {
    let mut urls = Vec::new();
    for (lineno, line) in read_lines(path).await?.iter().enumerate() {
        let url = serde_json::from_str::<serde_json::Value>(line)
            .ok()
            .and_then(|v| {
                v.get("article_url")
                    .or_else(|| v.get("url"))
                    .and_then(|u| u.as_str())
                    .map(str::to_string)
            });
        match url {
            Some(u) => urls.push(u),
            None => warn!(
                line = lineno + 1,
                preview = %truncate_for_log(line, 120),
                "Skipping malformed success record"
            ),
        }
    }
    Ok(urls)
}

/// URLs already recorded in a success log.
pub async fn load_success_urls(path: &Path) -> Result<HashSet<String>, ScrapeError> {
    let urls: HashSet<String> = success_urls(path).await?.into_iter().collect();
    debug!(count = urls.len(), "Loaded already-scraped URLs");
    Ok(urls)
}

/// Failure records from a failure log, in file order.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn load_failures(path: &Path) -> Result<Vec<FailureRecord>, ScrapeError> {
    let mut out = Vec::new();
    for (lineno, line) in read_lines(path).await?.iter().enumerate() {
        match serde_json::from_str::<FailureRecord>(line) {
            Ok(rec) => out.push(rec),
            Err(e) => warn!(
                line = lineno + 1,
                error = %e,
                preview = %truncate_for_log(line, 120),
                "Skipping malformed failure record"
            ),
        }
    }
    Ok(out)
}

/// Replace the whole failure log with `records`.
///
/// This truncates first; a crash before the write completes loses the
/// previous contents.
pub async fn overwrite_failures(path: &Path, records: &[FailureRecord]) -> Result<(), ScrapeError> {
    let mut buf = Vec::new();
    for rec in records {
        serde_json::to_writer(&mut buf, rec)?;
        buf.push(b'\n');
    }
    fs::write(path, buf)
        .await
        .map_err(|e| ScrapeError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleRecord;

    #[tokio::test]
    async fn test_append_creates_and_flushes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = success_log_path(tmp.path(), "st_2024_01");
        let mut log = OutputLog::open(&path).await.unwrap();
        assert!(path.exists());

        log.append(&ArticleRecord::new("https://x/1")).await.unwrap();
        log.append(&ArticleRecord::new("https://x/2")).await.unwrap();
        assert_eq!(log.path(), path.as_path());

        // Visible to a reader before the handle is dropped.
        let urls = load_success_urls(&path).await.unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains("https://x/2"));
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let path = failure_log_path(tmp.path(), "b");
        OutputLog::open(&path)
            .await
            .unwrap()
            .append(&FailureRecord::new("https://x/1", "m", "t"))
            .await
            .unwrap();
        OutputLog::open(&path)
            .await
            .unwrap()
            .append(&FailureRecord::new("https://x/2", "m", "t"))
            .await
            .unwrap();
        assert_eq!(load_failures(&path).await.unwrap().len(), 2);
        assert!(path.ends_with("b_errors.jsonl"));
    }

    #[tokio::test]
    async fn test_readers_skip_malformed_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let ok = tmp.path().join("a.jsonl");
        fs::write(
            &ok,
            "{\"article_url\":\"https://x/1\"}\nnot json\n\n{\"url\":\"https://x/2\"}\n{\"title\":\"no url\"}\n",
        )
        .await
        .unwrap();
        let urls = load_success_urls(&ok).await.unwrap();
        assert_eq!(urls.len(), 2);

        let bad = tmp.path().join("a_errors.jsonl");
        fs::write(
            &bad,
            "[\"ERROR\",\"https://x/3\",\"boom\",\"\"]\n{broken\n[\"ERROR\"]\n",
        )
        .await
        .unwrap();
        let failures = load_failures(&bad).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error_message, "boom");
    }

    #[tokio::test]
    async fn test_missing_logs_read_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_success_urls(&tmp.path().join("none.jsonl")).await.unwrap().is_empty());
        assert!(load_failures(&tmp.path().join("none_errors.jsonl")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = failure_log_path(tmp.path(), "b");
        overwrite_failures(&path, &[FailureRecord::new("u1", "m", "t"), FailureRecord::new("u2", "m", "t")])
            .await
            .unwrap();
        overwrite_failures(&path, &[]).await.unwrap();
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "");
    }
}
