//! Parallel file scheduler.
//!
//! Runs one batch per input file across a fixed pool of worker threads.
//! Each worker pulls the next file from a shared index and drives the batch
//! on its own single-threaded tokio runtime, so batches on different
//! workers share nothing but the launcher recipe.
//!
//! When a batch finishes, its input is renamed from `unseen/` into `seen/`.
//! That rename is the only completion marker: a file still in `unseen/` is
//! outstanding work. A batch that errors or panics leaves its file where it
//! is and does not disturb the other workers.

use crate::browser::Launcher;
use crate::error::ScrapeError;
use crate::orchestrator;
use crate::pipeline::Pipeline;
use crate::utils::ensure_writable_dir;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;
use tokio::runtime::Builder;
use tracing::{error, info, info_span, warn};

/// The four directories of one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDirs {
    /// Pending URL lists.
    pub unseen: PathBuf,
    /// Processed URL lists.
    pub seen: PathBuf,
    /// Success logs.
    pub scraped: PathBuf,
    /// Failure logs.
    pub unsuccessful: PathBuf,
}

impl SiteDirs {
    pub fn new(base: &Path) -> Self {
        Self {
            unseen: base.join("unseen"),
            seen: base.join("seen"),
            scraped: base.join("scraped"),
            unsuccessful: base.join("unsuccessful"),
        }
    }

    /// Create any missing directory and check each one is writable.
    pub async fn create(&self) -> Result<(), ScrapeError> {
        for dir in [&self.unseen, &self.seen, &self.scraped, &self.unsuccessful] {
            ensure_writable_dir(dir)
                .await
                .map_err(|e| ScrapeError::io(dir, e))?;
        }
        Ok(())
    }

    /// Pending `*.txt` inputs, sorted by name.
    pub fn pending_files(&self) -> Result<Vec<PathBuf>, ScrapeError> {
        let entries =
            std::fs::read_dir(&self.unseen).map_err(|e| ScrapeError::io(&self.unseen, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| ScrapeError::io(&self.unseen, e))?.path();
            if path.is_file() && path.extension().is_some_and(|x| x == "txt") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Batch completed and the input now lives at `moved_to`.
    Done { batch: String, moved_to: PathBuf },
    /// Batch failed; the input is still pending.
    Failed { input: PathBuf, reason: String },
}

impl FileStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, FileStatus::Done { .. })
    }
}

pub struct FileScheduler<L> {
    pipeline: Pipeline<L>,
    dirs: SiteDirs,
    workers: usize,
    concurrency: usize,
}

impl<L> FileScheduler<L>
where
    L: Launcher + Clone + Send + Sync,
{
    pub fn new(pipeline: Pipeline<L>, dirs: SiteDirs, workers: usize, concurrency: usize) -> Self {
        Self {
            pipeline,
            dirs,
            workers: workers.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Run every file and report per-file status, in input order.
    ///
    /// Blocks the calling thread until all workers finish.
    pub fn run_all(&self, files: &[PathBuf]) -> Vec<FileStatus> {
        let t0 = Instant::now();
        let next = AtomicUsize::new(0);
        let statuses: Mutex<Vec<Option<FileStatus>>> = Mutex::new(vec![None; files.len()]);
        let workers = self.workers.min(files.len());
        info!(files = files.len(), workers, "Scheduling batches");

        thread::scope(|scope| {
            for worker in 0..workers {
                let next = &next;
                let statuses = &statuses;
                scope.spawn(move || {
                    let _span = info_span!("worker", worker).entered();
                    loop {
                        let i = next.fetch_add(1, Ordering::SeqCst);
                        let Some(file) = files.get(i) else { break };
                        let status = self.run_file(file);
                        if let Ok(mut slots) = statuses.lock() {
                            slots[i] = Some(status);
                        }
                    }
                });
            }
        });

        let statuses: Vec<FileStatus> = statuses
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .into_iter()
            .zip(files)
            .map(|(status, file)| {
                status.unwrap_or_else(|| FileStatus::Failed {
                    input: file.clone(),
                    reason: "no worker ran this file".to_string(),
                })
            })
            .collect();

        let done = statuses.iter().filter(|s| s.is_done()).count();
        info!(
            done,
            failed = statuses.len() - done,
            elapsed_ms = t0.elapsed().as_millis(),
            "All batches finished"
        );
        statuses
    }

    fn run_file(&self, input: &Path) -> FileStatus {
        info!(file = %input.display(), "Processing file");
        let failed = |reason: String| {
            error!(file = %input.display(), %reason, "File left pending");
            FileStatus::Failed {
                input: input.to_path_buf(),
                reason,
            }
        };

        let runtime = match Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => return failed(format!("runtime start failed: {e}")),
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            runtime.block_on(orchestrator::run(
                &self.pipeline,
                input,
                &self.dirs.scraped,
                &self.dirs.unsuccessful,
                self.concurrency,
            ))
        }));

        let batch = match outcome {
            Ok(Ok(batch)) => batch,
            Ok(Err(e)) => return failed(e.to_string()),
            Err(panic) => return failed(format!("worker panicked: {}", panic_message(&*panic))),
        };

        let Some(name) = input.file_name() else {
            return failed("input has no file name".to_string());
        };
        let moved_to = self.dirs.seen.join(name);
        if let Err(e) = std::fs::rename(input, &moved_to) {
            warn!(file = %input.display(), error = %e, "Could not move finished input to seen/");
            return failed(format!("rename to {} failed: {e}", moved_to.display()));
        }
        info!(%batch, moved_to = %moved_to.display(), "File done");
        FileStatus::Done { batch, moved_to }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
