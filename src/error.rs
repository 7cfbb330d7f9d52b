//! Error types for fetching, extraction, and batch bookkeeping.
//!
//! The taxonomy mirrors how failures are handled downstream:
//!
//! - [`FetchError`] is transient and retried by the fetch+extract wrapper.
//! - [`ExtractError`] is terminal for a URL and becomes a failure record.
//! - [`ScrapeError`] is fatal for a whole batch (input unreadable, output
//!   unwritable, browser would not start).

use std::error::Error;
use std::time::Duration;
use thiserror::Error;

/// Failure while loading a page through the browser.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("readiness selector `{selector}` not found on {url} within {timeout:?}")]
    ReadinessTimeout {
        url: String,
        selector: String,
        timeout: Duration,
    },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser protocol error: {0}")]
    Browser(String),

    #[error("browser context pool is closed")]
    PoolClosed,

    #[error("fetch slots closed")]
    SlotsClosed,
}

impl From<chromiumoxide::error::CdpError> for FetchError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        FetchError::Browser(e.to_string())
    }
}

/// Failure while turning a rendered document into a record.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no <{0}> element found")]
    MissingElement(String),

    #[error("invalid selector `{0}`")]
    Selector(String),

    #[error("extraction worker failed: {0}")]
    Worker(String),
}

/// Batch-level failure. A batch that hits one of these is left pending.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ScrapeError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        ScrapeError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Render an error and its `source()` chain, one cause per line.
///
/// This is what failure records store in their trace slot.
pub fn error_chain(e: &dyn Error) -> String {
    let mut out = format!("{e:?}");
    let mut cause = e.source();
    while let Some(c) = cause {
        out.push_str("\ncaused by: ");
        out.push_str(&c.to_string());
        cause = c.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_includes_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ScrapeError::io("/tmp/x.txt", io);
        let chain = error_chain(&err);
        assert!(chain.starts_with("Io"));
        assert!(chain.contains("caused by: gone"));
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::ReadinessTimeout {
            url: "https://example.com/a".into(),
            selector: "article".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "readiness selector `article` not found on https://example.com/a within 30s"
        );
    }
}
