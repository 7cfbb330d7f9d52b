//! Headless Chromium engine driven over CDP with chromiumoxide.
//!
//! Each pooled context is a CDP browser context (`Target.createBrowserContext`),
//! so cookies and storage are isolated per slot while sharing one browser
//! process. Pages are opened inside a context and closed after every fetch.

use super::{BrowserPage, BrowserSettings, Engine, Launcher};
use crate::error::FetchError;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

const DEFAULT_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-web-security",
    "--disable-features=VizDisplayCompositor",
];

/// Launches Chromium with the configured settings.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    settings: BrowserSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn config(&self) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.settings.viewport_width, self.settings.viewport_height)
            .arg(format!("--user-agent={}", self.settings.user_agent));
        for arg in DEFAULT_ARGS {
            builder = builder.arg(*arg);
        }
        for arg in &self.settings.extra_args {
            builder = builder.arg(arg.as_str());
        }
        let executable = self
            .settings
            .executable
            .clone()
            .or_else(|| std::env::var_os("CHROME_PATH").map(Into::into));
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(FetchError::Launch)
    }
}

impl Launcher for ChromiumLauncher {
    type Engine = ChromiumEngine;

    #[instrument(level = "info", skip_all)]
    async fn launch(&self) -> Result<ChromiumEngine, FetchError> {
        let config = self.config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Launch(e.to_string()))?;

        // The handler drives the CDP connection and must be polled for the
        // browser to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler event error");
                }
            }
        });

        info!("Browser launched");
        Ok(ChromiumEngine {
            browser,
            handler_task,
        })
    }
}

/// One running Chromium process.
pub struct ChromiumEngine {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl Engine for ChromiumEngine {
    type Context = BrowserContextId;
    type Page = ChromiumPage;

    async fn new_context(&self) -> Result<BrowserContextId, FetchError> {
        let resp = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await?;
        Ok(resp.result.browser_context_id)
    }

    async fn open_page(&self, context: &BrowserContextId) -> Result<ChromiumPage, FetchError> {
        let mut params = CreateTargetParams::new("about:blank");
        params.browser_context_id = Some(context.clone());
        let page = self.browser.new_page(params).await?;
        Ok(ChromiumPage { page })
    }

    async fn close_context(&self, context: BrowserContextId) -> Result<(), FetchError> {
        self.browser
            .execute(DisposeBrowserContextParams::new(context))
            .await?;
        Ok(())
    }

    async fn shutdown(mut self) -> Result<(), FetchError> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Waiting for browser process exit failed");
        }
        self.handler_task.abort();
        closed?;
        info!("Browser shut down");
        Ok(())
    }
}

/// A single Chromium tab.
pub struct ChromiumPage {
    page: Page,
}

impl BrowserPage for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<(), FetchError> {
        let resp = self.page.execute(NavigateParams::new(url)).await?;
        match resp.result.error_text.as_deref() {
            Some(reason) if !reason.is_empty() => Err(FetchError::Navigation {
                url: url.to_string(),
                reason: reason.to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn wait_for(&self, selector: &str) -> Result<(), FetchError> {
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn content(&self) -> Result<String, FetchError> {
        Ok(self.page.content().await?)
    }

    async fn close(self) -> Result<(), FetchError> {
        self.page.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_uses_explicit_executable() {
        let settings = BrowserSettings {
            executable: Some("/opt/chrome/chrome".into()),
            ..BrowserSettings::default()
        };
        let launcher = ChromiumLauncher::new(settings);
        assert!(launcher.config().is_ok());
    }
}
