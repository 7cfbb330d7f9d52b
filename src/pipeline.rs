//! Single-URL fetch+extract path shared by batch runs and retry sweeps.
//!
//! [`Pipeline`] is the cloneable recipe (launcher, extractor, fetch knobs,
//! optional summary settings); [`Pipeline::start`] launches a browser and
//! returns an [`ArticleScraper`] that owns it for the length of one batch.
//!
//! For each URL the scraper:
//! 1. fetches the page, retrying up to the site's attempt count,
//! 2. parses and extracts on a blocking worker thread,
//! 3. optionally asks for a summary of the body text.
//!
//! Every outcome, good or bad, comes back as a [`ScrapeOutcome`]; nothing
//! here returns early with an error for a single URL.

use crate::api::{Summarize, SummarySettings, Summarizer, summarizer};
use crate::browser::Launcher;
use crate::error::{ExtractError, FetchError, error_chain};
use crate::fetcher::{FetchSettings, PageFetcher};
use crate::models::{ArticleRecord, FailureRecord, FetchTask, ScrapeOutcome};
use crate::scrapers::Extractor;
use crate::utils::truncate_chars;
use scraper::Html;
use std::error::Error;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

#[derive(Clone)]
pub struct Pipeline<L> {
    launcher: L,
    extractor: Arc<dyn Extractor>,
    settings: FetchSettings,
    fetch_attempts: usize,
    summary: Option<SummarySettings>,
}

impl<L: Launcher + Clone> Pipeline<L> {
    /// Fetch attempts default to the extractor's own count.
    pub fn new(launcher: L, extractor: Arc<dyn Extractor>, settings: FetchSettings) -> Self {
        let fetch_attempts = extractor.fetch_attempts();
        Self {
            launcher,
            extractor,
            settings,
            fetch_attempts,
            summary: None,
        }
    }

    pub fn with_fetch_attempts(mut self, attempts: usize) -> Self {
        self.fetch_attempts = attempts.max(1);
        self
    }

    pub fn with_summary(mut self, summary: Option<SummarySettings>) -> Self {
        self.summary = summary;
        self
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn fetch_attempts(&self) -> usize {
        self.fetch_attempts
    }

    /// Launch a browser sized for `concurrency` simultaneous loads.
    pub async fn start(&self, concurrency: usize) -> Result<ArticleScraper<L>, FetchError> {
        let settings = FetchSettings {
            concurrency: concurrency.max(1),
            ..self.settings.clone()
        };
        let fetcher = PageFetcher::launch(self.launcher.clone(), settings).await?;
        Ok(ArticleScraper {
            fetcher,
            extractor: Arc::clone(&self.extractor),
            attempts: self.fetch_attempts,
            summarizer: self
                .summary
                .as_ref()
                .map(|s| (summarizer(s), s.max_chars)),
        })
    }
}

/// A running fetch+extract path bound to one browser.
pub struct ArticleScraper<L: Launcher> {
    fetcher: PageFetcher<L>,
    extractor: Arc<dyn Extractor>,
    attempts: usize,
    summarizer: Option<(Summarizer, usize)>,
}

impl<L: Launcher> ArticleScraper<L> {
    pub fn fetcher(&self) -> &PageFetcher<L> {
        &self.fetcher
    }

    /// Scrape one URL into a success or failure record.
    #[instrument(level = "debug", skip(self), fields(site = self.extractor.name()))]
    pub async fn scrape(&self, url: &str) -> ScrapeOutcome {
        let t0 = Instant::now();
        let task = FetchTask::new(url);

        let html = match self.fetch_with_retry(task).await {
            Ok(html) => html,
            Err(e) => return failure(url, &e),
        };

        let mut record = match self.extract(html, url).await {
            Ok(record) => record,
            Err(e) => {
                warn!(%url, error = %e, "Extraction failed");
                return failure(url, &e);
            }
        };

        if let Some((summarizer, max_chars)) = &self.summarizer {
            record.summary = summarize(summarizer, *max_chars, &record).await;
        }

        debug!(%url, elapsed_ms = t0.elapsed().as_millis(), "Scraped article");
        ScrapeOutcome::Success(record)
    }

    pub async fn shutdown(self) {
        self.fetcher.shutdown().await;
    }

    async fn fetch_with_retry(&self, mut task: FetchTask) -> Result<String, FetchError> {
        loop {
            task.attempt += 1;
            match self.fetcher.fetch(&task.url).await {
                Ok(html) => return Ok(html),
                Err(e) if task.attempt < self.attempts => {
                    info!(
                        url = %task.url,
                        attempt = task.attempt,
                        max = self.attempts,
                        error = %e,
                        "Fetch attempt failed; retrying"
                    );
                }
                Err(e) => {
                    warn!(
                        url = %task.url,
                        attempts = task.attempt,
                        error = %e,
                        "Giving up on URL"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Parse and extract off the async scheduler.
    async fn extract(&self, html: String, url: &str) -> Result<ArticleRecord, ExtractError> {
        let extractor = Arc::clone(&self.extractor);
        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            let document = Html::parse_document(&html);
            extractor.extract(&document, &url)
        })
        .await
        .map_err(|e| ExtractError::Worker(e.to_string()))?
    }
}

fn failure(url: &str, e: &(dyn Error + 'static)) -> ScrapeOutcome {
    ScrapeOutcome::Failure(FailureRecord::new(url, e.to_string(), error_chain(e)))
}

async fn summarize(
    summarizer: &Summarizer,
    max_chars: usize,
    record: &ArticleRecord,
) -> Option<String> {
    if record.body_text.trim().is_empty() {
        return None;
    }
    let text = truncate_chars(&record.body_text, max_chars);
    match summarizer.summarize(text).await {
        Ok(summary) => Some(summary),
        Err(e) => {
            error!(url = %record.url, error = %e, "Summary failed; keeping article without one");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::scripted::{Script, ScriptStats, ScriptedLauncher, article_html};
    use crate::scrapers::SiteKind;
    use crate::scrapers::common::ImageFilter;

    fn pipeline(launcher: ScriptedLauncher) -> Pipeline<ScriptedLauncher> {
        Pipeline::new(
            launcher,
            SiteKind::StraitsTimes.extractor(ImageFilter::default()),
            FetchSettings::for_tests(2),
        )
    }

    #[tokio::test]
    async fn test_scrape_success() {
        let launcher = ScriptedLauncher::new([(
            "https://x/ok".to_string(),
            Script::Html(article_html("Hello", "World")),
        )]);
        let scraper = pipeline(launcher).start(2).await.unwrap();

        match scraper.scrape("https://x/ok").await {
            ScrapeOutcome::Success(rec) => {
                assert_eq!(rec.url, "https://x/ok");
                assert_eq!(rec.title.as_deref(), Some("Hello"));
                assert!(rec.body_text.contains("World"));
                assert_eq!(rec.summary, None);
            }
            other => panic!("expected success, got {other:?}"),
        }
        scraper.shutdown().await;
    }

    #[tokio::test]
    async fn test_readiness_retry_stops_on_first_success() {
        let launcher = ScriptedLauncher::new([(
            "https://x/flaky".to_string(),
            Script::FlakyThen {
                fails: 1,
                then: article_html("Late", "Body"),
            },
        )]);
        let stats = Arc::clone(&launcher.stats);
        let scraper = pipeline(launcher).start(1).await.unwrap();

        assert!(scraper.scrape("https://x/flaky").await.is_success());
        assert_eq!(stats.loads_of("https://x/flaky"), 2);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_become_failure_record() {
        let launcher = ScriptedLauncher::new([("https://x/hang".to_string(), Script::Hang)]);
        let stats = Arc::clone(&launcher.stats);
        let scraper = pipeline(launcher)
            .with_fetch_attempts(3)
            .start(1)
            .await
            .unwrap();

        match scraper.scrape("https://x/hang").await {
            ScrapeOutcome::Failure(f) => {
                assert_eq!(f.url, "https://x/hang");
                assert!(f.error_message.contains("timed out"));
                assert!(f.stack_trace.starts_with("NavigationTimeout"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(stats.loads_of("https://x/hang"), 3);
        assert_eq!(ScriptStats::get(&stats.pages_closed), 3);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_not_refetched() {
        // Readiness keys on <body>, so the page loads but has no <article>.
        let launcher = ScriptedLauncher::new([(
            "https://x/paywall".to_string(),
            Script::Html("<html><body><div>subscribe</div></body></html>".into()),
        )]);
        let stats = Arc::clone(&launcher.stats);
        let settings = FetchSettings {
            readiness_selector: "body".into(),
            ..FetchSettings::for_tests(1)
        };
        let pipeline = Pipeline::new(
            launcher,
            SiteKind::StraitsTimes.extractor(ImageFilter::default()),
            settings,
        );
        let scraper = pipeline.start(1).await.unwrap();

        match scraper.scrape("https://x/paywall").await {
            ScrapeOutcome::Failure(f) => assert_eq!(f.error_message, "no <article> element found"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(stats.loads_of("https://x/paywall"), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_surfaces_from_start() {
        let result = pipeline(ScriptedLauncher::failing()).start(1).await;
        assert!(matches!(result, Err(FetchError::Launch(_))));
    }
}
