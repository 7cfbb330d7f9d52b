//! Data models for scraped articles and their persisted log records.
//!
//! This module defines the core data structures flowing through a batch:
//! - [`FetchTask`]: One pending URL and how many times it has been attempted
//! - [`ArticleRecord`]: A successfully extracted article (one line in `<batch>.jsonl`)
//! - [`FailureRecord`]: A terminal failure (one line in `<batch>_errors.jsonl`)
//! - [`ScrapeOutcome`]: Either of the above, as produced by the fetch+extract path
//!
//! Success records keep the JSON keys that existing scrape logs already use
//! (`article_url`, `site_title`, `content`) and accept the shorter names as
//! aliases when reading.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

/// Marker stored in the first slot of every failure record.
pub const ERROR_MARKER: &str = "ERROR";

/// A URL scheduled for fetching, with its attempt counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub url: String,
    pub attempt: usize,
}

impl FetchTask {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attempt: 0,
        }
    }
}

/// An image found in the article body.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImageRecord {
    /// Absolute image URL, resolved against the page URL.
    pub image_url: String,
    /// The `alt` attribute, if non-empty.
    #[serde(default)]
    pub alt_text: Option<String>,
    /// Caption text from a `figcaption` or site-specific caption wrapper.
    #[serde(default)]
    pub caption: Option<String>,
}

/// A successfully scraped article.
///
/// Only `url` is guaranteed; everything else is best-effort.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArticleRecord {
    #[serde(rename = "article_url", alias = "url")]
    pub url: String,
    #[serde(rename = "site_title", alias = "title", default)]
    pub title: Option<String>,
    /// ISO-8601 publication date or timestamp.
    #[serde(default)]
    pub publish_date: Option<String>,
    #[serde(rename = "content", alias = "body_text", default)]
    pub body_text: String,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ArticleRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            publish_date: None,
            body_text: String::new(),
            images: Vec::new(),
            summary: None,
        }
    }
}

/// A URL that could not be scraped.
///
/// Persisted as a four-element JSON array:
/// `["ERROR", url, error_message, stack_trace]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub url: String,
    pub error_message: String,
    pub stack_trace: String,
}

impl FailureRecord {
    pub fn new(
        url: impl Into<String>,
        error_message: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            error_message: error_message.into(),
            stack_trace: stack_trace.into(),
        }
    }
}

impl Serialize for FailureRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(4)?;
        tup.serialize_element(ERROR_MARKER)?;
        tup.serialize_element(&self.url)?;
        tup.serialize_element(&self.error_message)?;
        tup.serialize_element(&self.stack_trace)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for FailureRecord {
    /// Accepts any array with a string URL in slot 1; message and trace
    /// default to empty when absent or not strings.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parts: Vec<serde_json::Value> = Vec::deserialize(deserializer)?;
        if parts.len() < 2 {
            return Err(de::Error::invalid_length(parts.len(), &"at least 2 elements"));
        }
        let url = parts[1]
            .as_str()
            .ok_or_else(|| de::Error::custom("url slot is not a string"))?
            .to_string();
        let text_at = |i: usize| {
            parts
                .get(i)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Ok(FailureRecord {
            url,
            error_message: text_at(2),
            stack_trace: text_at(3),
        })
    }
}

/// Result of the fetch+extract path for one URL.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    Success(ArticleRecord),
    Failure(FailureRecord),
}

#[cfg(test)]
impl ScrapeOutcome {
    pub fn url(&self) -> &str {
        match self {
            ScrapeOutcome::Success(r) => &r.url,
            ScrapeOutcome::Failure(f) => &f.url,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeOutcome::Success(_))
    }
}
