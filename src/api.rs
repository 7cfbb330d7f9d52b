//! Optional article summaries from an OpenAI-compatible chat endpoint.
//!
//! # Architecture
//!
//! - [`Summarize`]: Core trait defining async summarization
//! - [`ChatSummarizer`]: Calls `POST {endpoint}/chat/completions` with reqwest
//! - [`RetrySummarize`]: Decorator adding exponential backoff to any [`Summarize`]
//!
//! # Retry Strategy
//!
//! - Maximum 5 retry attempts
//! - Exponential backoff starting at 1 second
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

const SYSTEM_PROMPT: &str = "You are a news summarization assistant. Provide a concise \
    100-word or less summary of the article content. Focus on key facts, events, and \
    conclusions. Respond with the summary directly without saying anything else.";

/// Where and how to ask for summaries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    /// Base URL, e.g. `http://localhost:8124/v1`.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Body text beyond this many characters is cut before sending.
    pub max_chars: usize,
    pub max_retries: usize,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8124/v1".to_string(),
            model: "unsloth/Llama-3.2-3B-Instruct".to_string(),
            api_key: None,
            max_chars: 12_000,
            max_retries: 5,
        }
    }
}

/// Trait for async summarization.
pub trait Summarize {
    async fn summarize(&self, text: &str) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`Summarize`] implementation.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetrySummarize<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T: Summarize> RetrySummarize<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetrySummarize<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySummarize")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: Summarize> Summarize for RetrySummarize<T> {
    #[instrument(level = "debug", skip_all)]
    async fn summarize(&self, text: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.summarize(text).await {
                Ok(summary) => return Ok(summary),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "summarize() exhausted retries"
                        );
                        return Err(e);
                    }

                    let shift = (attempt - 1).min(16) as u32;
                    let delay = self
                        .base_delay
                        .saturating_mul(1 << shift)
                        .min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "summarize() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Single-shot client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatSummarizer {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl ChatSummarizer {
    pub fn new(settings: &SummarySettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/chat/completions", settings.endpoint.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key: settings
                .api_key
                .clone()
                .unwrap_or_else(|| "no-api-key-required".to_string()),
        }
    }
}

impl Summarize for ChatSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: format!("{SYSTEM_PROMPT}\nArticle contents:\n{text}"),
            }],
        };
        let response: ChatResponse = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "empty completion".into())
    }
}

/// The summarizer used by the scrape pipeline.
pub type Summarizer = RetrySummarize<ChatSummarizer>;

pub fn summarizer(settings: &SummarySettings) -> Summarizer {
    RetrySummarize::new(
        ChatSummarizer::new(settings),
        settings.max_retries,
        StdDuration::from_secs(1),
    )
}
