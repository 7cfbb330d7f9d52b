//! Run configuration.
//!
//! Settings come from an optional YAML file; every key may be omitted and
//! falls back to the defaults below. Command-line flags override the file.
//!
//! ```yaml
//! site: business_times
//! concurrency: 10
//! parallel_files: 4
//! pages_before_restart: 1500
//! navigation_timeout_secs: 30
//! readiness_timeout_secs: 30
//! fetch_attempts: 3            # default: per site
//! jitter_ms: [50, 200]
//! readiness_selector: article  # default: per site
//! retry_concurrency: 1
//! excluded_image_patterns:
//!   - "/logo\\.png$"
//! browser:
//!   executable: /usr/bin/chromium
//!   extra_args: ["--disable-gpu"]
//! summary:
//!   endpoint: http://localhost:8124/v1
//!   model: unsloth/Llama-3.2-3B-Instruct
//! ```

use crate::api::SummarySettings;
use crate::browser::BrowserSettings;
use crate::error::ScrapeError;
use crate::fetcher::FetchSettings;
use crate::scrapers::common::{self, ImageFilter};
use crate::scrapers::{Extractor, SiteKind};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub site: SiteKind,
    /// Simultaneous page loads within one batch.
    pub concurrency: usize,
    /// Batches (input files) run at once.
    pub parallel_files: usize,
    pub pages_before_restart: usize,
    pub navigation_timeout_secs: u64,
    pub readiness_timeout_secs: u64,
    pub fetch_attempts: Option<usize>,
    pub jitter_ms: (u64, u64),
    pub readiness_selector: Option<String>,
    /// Simultaneous page loads during a retry sweep.
    pub retry_concurrency: usize,
    pub excluded_image_patterns: Vec<String>,
    pub browser: BrowserSettings,
    pub summary: Option<SummarySettings>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        let fetch = FetchSettings::default();
        Self {
            site: SiteKind::default(),
            concurrency: fetch.concurrency,
            parallel_files: 4,
            pages_before_restart: fetch.pages_before_restart,
            navigation_timeout_secs: fetch.navigation_timeout.as_secs(),
            readiness_timeout_secs: fetch.readiness_timeout.as_secs(),
            fetch_attempts: None,
            jitter_ms: fetch.jitter_ms,
            readiness_selector: None,
            retry_concurrency: 1,
            excluded_image_patterns: Vec::new(),
            browser: BrowserSettings::default(),
            summary: None,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub site: Option<SiteKind>,
    pub concurrency: Option<usize>,
    pub parallel_files: Option<usize>,
    pub pages_before_restart: Option<usize>,
}

impl SweepConfig {
    /// Load from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ScrapeError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| ScrapeError::io(path, e))?;
        let config = Self::from_yaml(&raw)?;
        debug!(?config, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ScrapeError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| ScrapeError::Config(e.to_string()))
    }

    pub fn apply(mut self, o: &Overrides) -> Self {
        if let Some(site) = o.site {
            self.site = site;
        }
        if let Some(n) = o.concurrency {
            self.concurrency = n;
        }
        if let Some(n) = o.parallel_files {
            self.parallel_files = n;
        }
        if let Some(n) = o.pages_before_restart {
            self.pages_before_restart = n;
        }
        self
    }

    /// The site extractor, with the configured image exclusions compiled in.
    pub fn extractor(&self) -> Result<Arc<dyn Extractor>, ScrapeError> {
        let filter = ImageFilter::new(&self.excluded_image_patterns)
            .map_err(|e| ScrapeError::Config(format!("excluded_image_patterns: {e}")))?;
        Ok(self.site.extractor(filter))
    }

    /// Fetch settings for `extractor`, whose readiness selector applies
    /// unless the file sets one.
    pub fn fetch_settings(&self, extractor: &dyn Extractor) -> Result<FetchSettings, ScrapeError> {
        let readiness_selector = self
            .readiness_selector
            .clone()
            .unwrap_or_else(|| extractor.readiness_selector().to_string());
        common::selector(&readiness_selector).map_err(|e| ScrapeError::Config(e.to_string()))?;
        Ok(FetchSettings {
            concurrency: self.concurrency.max(1),
            pages_before_restart: self.pages_before_restart,
            navigation_timeout: Duration::from_secs(self.navigation_timeout_secs),
            readiness_timeout: Duration::from_secs(self.readiness_timeout_secs),
            readiness_selector,
            jitter_ms: self.jitter_ms,
        })
    }
}
