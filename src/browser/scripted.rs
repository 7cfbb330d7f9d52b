//! In-memory browser engine for tests.
//!
//! Pages are served from a URL -> [`Script`] table. The shared [`ScriptStats`]
//! record launches, shutdowns, context churn, and the peak number of pages
//! in the navigation/readiness phase at once.

use super::{BrowserPage, Engine, Launcher};
use crate::error::FetchError;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Script {
    /// Serve this HTML.
    Html(String),
    /// Never finish navigating.
    Hang,
    /// Fail navigation outright.
    Refuse(String),
    /// Serve a page without `<article>` for the first `fails` loads, then `then`.
    FlakyThen { fails: usize, then: String },
}

#[derive(Debug, Default)]
pub struct ScriptStats {
    pub launches: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub contexts_opened: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub navigations: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    loads: Mutex<HashMap<String, usize>>,
}

impl ScriptStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn loads_of(&self, url: &str) -> usize {
        self.loads
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    scripts: Arc<HashMap<String, Script>>,
    pub stats: Arc<ScriptStats>,
    /// Artificial navigation latency so concurrent fetches overlap.
    latency: Duration,
    fail_launch: Arc<AtomicBool>,
}

impl ScriptedLauncher {
    pub fn new(scripts: impl IntoIterator<Item = (String, Script)>) -> Self {
        Self {
            scripts: Arc::new(scripts.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing() -> Self {
        let launcher = Self::default();
        launcher.fail_launches(true);
        launcher
    }

    /// Make every later launch (by this launcher or its clones) fail or succeed.
    pub fn fail_launches(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }
}

/// A small article page whose `<article>` holds a headline and a paragraph.
pub fn article_html(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{title} | Test</title></head>\
         <body><article><h1>{title}</h1>\
         <time datetime=\"2024-01-15T08:30:00+08:00\">15 Jan 2024</time>\
         <p>{body}</p></article></body></html>"
    )
}

impl Launcher for ScriptedLauncher {
    type Engine = ScriptedEngine;

    async fn launch(&self) -> Result<ScriptedEngine, FetchError> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(FetchError::Launch("scripted launch failure".into()));
        }
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedEngine {
            scripts: Arc::clone(&self.scripts),
            stats: Arc::clone(&self.stats),
            latency: self.latency,
        })
    }
}

pub struct ScriptedEngine {
    scripts: Arc<HashMap<String, Script>>,
    stats: Arc<ScriptStats>,
    latency: Duration,
}

impl Engine for ScriptedEngine {
    type Context = usize;
    type Page = ScriptedPage;

    async fn new_context(&self) -> Result<usize, FetchError> {
        Ok(self.stats.contexts_opened.fetch_add(1, Ordering::SeqCst))
    }

    async fn open_page(&self, _context: &usize) -> Result<ScriptedPage, FetchError> {
        self.stats.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedPage {
            scripts: Arc::clone(&self.scripts),
            stats: Arc::clone(&self.stats),
            latency: self.latency,
            html: Mutex::new(None),
            counted: Mutex::new(false),
        })
    }

    async fn close_context(&self, _context: usize) -> Result<(), FetchError> {
        self.stats.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(self) -> Result<(), FetchError> {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct ScriptedPage {
    scripts: Arc<HashMap<String, Script>>,
    stats: Arc<ScriptStats>,
    latency: Duration,
    html: Mutex<Option<String>>,
    counted: Mutex<bool>,
}

impl ScriptedPage {
    fn enter(&self) {
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        *self.counted.lock().unwrap() = true;
    }

    fn leave(&self) {
        let mut counted = self.counted.lock().unwrap();
        if *counted {
            self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
            *counted = false;
        }
    }
}

impl BrowserPage for ScriptedPage {
    async fn navigate(&self, url: &str) -> Result<(), FetchError> {
        self.enter();
        self.stats.navigations.fetch_add(1, Ordering::SeqCst);
        let load = {
            let mut loads = self.stats.loads.lock().unwrap();
            let n = loads.entry(url.to_string()).or_default();
            *n += 1;
            *n
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let html = match self.scripts.get(url) {
            None => {
                return Err(FetchError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_NAME_NOT_RESOLVED".into(),
                });
            }
            Some(Script::Hang) => std::future::pending::<String>().await,
            Some(Script::Refuse(reason)) => {
                return Err(FetchError::Navigation {
                    url: url.to_string(),
                    reason: reason.clone(),
                });
            }
            Some(Script::Html(html)) => html.clone(),
            Some(Script::FlakyThen { fails, then }) => {
                if load <= *fails {
                    "<html><body><div>loading</div></body></html>".to_string()
                } else {
                    then.clone()
                }
            }
        };
        *self.html.lock().unwrap() = Some(html);
        Ok(())
    }

    async fn wait_for(&self, selector: &str) -> Result<(), FetchError> {
        let found = {
            let html = self.html.lock().unwrap();
            let sel = Selector::parse(selector)
                .map_err(|_| FetchError::Browser(format!("bad selector {selector}")))?;
            html.as_deref()
                .map(|h| Html::parse_document(h).select(&sel).next().is_some())
                .unwrap_or(false)
        };
        if found {
            Ok(())
        } else {
            std::future::pending().await
        }
    }

    async fn content(&self) -> Result<String, FetchError> {
        self.leave();
        Ok(self.html.lock().unwrap().clone().unwrap_or_default())
    }

    async fn close(self) -> Result<(), FetchError> {
        self.leave();
        self.stats.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
