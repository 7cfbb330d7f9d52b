//! Browser abstraction used by the page fetcher.
//!
//! Three traits split the browser along its resource lifetimes:
//!
//! | Trait | Lifetime | Owned by |
//! |-------|----------|----------|
//! | [`Launcher`] | whole run | the fetcher, used again on every recycle |
//! | [`Engine`] | one session (until the page budget is spent) | [`crate::session::Session`] |
//! | [`BrowserPage`] | one fetch | the fetch that opened it |
//!
//! Contexts (`Engine::Context`) sit between engine and page: they are
//! created once per session, pooled, and handed to one page at a time.
//!
//! Timeouts are enforced by the caller, so implementations may simply
//! await until the browser answers.

pub mod chromium;
pub mod pool;
#[cfg(test)]
pub mod scripted;

use crate::error::FetchError;
use serde::Deserialize;
use std::path::PathBuf;

/// Starts fresh browser engines.
pub trait Launcher {
    type Engine: Engine;

    /// Launch a new engine instance.
    async fn launch(&self) -> Result<Self::Engine, FetchError>;
}

/// A running browser engine.
pub trait Engine {
    /// An isolated browsing context (own cookies and storage).
    type Context;
    /// A single tab scoped to one context.
    type Page: BrowserPage;

    async fn new_context(&self) -> Result<Self::Context, FetchError>;

    async fn open_page(&self, context: &Self::Context) -> Result<Self::Page, FetchError>;

    async fn close_context(&self, context: Self::Context) -> Result<(), FetchError>;

    /// Terminate the engine. Consumes it; nothing may be used afterwards.
    async fn shutdown(self) -> Result<(), FetchError>;
}

/// A single tab.
pub trait BrowserPage {
    /// Navigate and return once the document is committed.
    async fn navigate(&self, url: &str) -> Result<(), FetchError>;

    /// Resolve once an element matching `selector` exists.
    async fn wait_for(&self, selector: &str) -> Result<(), FetchError>;

    /// The fully rendered document as HTML.
    async fn content(&self) -> Result<String, FetchError>;

    async fn close(self) -> Result<(), FetchError>;
}

/// Launch options for the production browser.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Explicit browser binary. Falls back to `CHROME_PATH`, then chromiumoxide's own lookup.
    pub executable: Option<PathBuf>,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Extra command-line switches appended after the defaults.
    pub extra_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                         AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/115.0.0.0 Safari/537.36"
                .to_string(),
            viewport_width: 1920,
            viewport_height: 1080,
            extra_args: Vec::new(),
        }
    }
}
