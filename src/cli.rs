//! Command-line interface definitions.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Shared options can also be provided through environment variables.

use crate::config::Overrides;
use crate::scrapers::SiteKind;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Resumable batch scraper for news sitemap URL lists.
///
/// # Examples
///
/// ```sh
/// # Scrape every pending list under ./data/st
/// news_sweep --base-dir ./data/st run
///
/// # Business Times, 6 files at a time, from a config file
/// news_sweep -b ./data/bt --site business-times -c sweep.yaml run --parallel-files 6
///
/// # Retry everything in unsuccessful/
/// news_sweep -b ./data/st retry
///
/// # List batches with more than 20 failures and put them back in unseen/
/// news_sweep -b ./data/st report --threshold 20 --requeue
///
/// # Count URLs per batch that are in neither log
/// news_sweep -b ./data/st report --coverage
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Site directory holding unseen/, seen/, scraped/ and unsuccessful/
    #[arg(short, long, env = "NEWS_SWEEP_BASE_DIR")]
    pub base_dir: PathBuf,

    /// Optional path to a YAML config file
    #[arg(short, long, env = "NEWS_SWEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Site extractor to use (overrides the config file)
    #[arg(short, long, value_enum)]
    pub site: Option<SiteKind>,

    /// Simultaneous page loads per batch
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Pages per browser session before it is restarted (0 disables)
    #[arg(long)]
    pub pages_before_restart: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scrape every pending URL list and move finished lists to seen/
    Run(RunArgs),
    /// Re-scrape failed URLs and rewrite the failure logs
    Retry {
        /// A single failure log; defaults to every log in unsuccessful/
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// List batches whose failure logs exceed a threshold
    Report {
        #[arg(short, long, default_value_t = 0)]
        threshold: usize,

        /// Move listed batches from seen/ back to unseen/
        #[arg(long)]
        requeue: bool,

        /// Instead, audit every input list against its success and failure logs
        #[arg(long, conflicts_with = "requeue")]
        coverage: bool,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Input files scraped at once
    #[arg(short, long)]
    pub parallel_files: Option<usize>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        let parallel_files = match &self.command {
            Command::Run(args) => args.parallel_files,
            _ => None,
        };
        Overrides {
            site: self.site,
            concurrency: self.concurrency,
            parallel_files,
            pages_before_restart: self.pages_before_restart,
        }
    }
}
