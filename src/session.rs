//! A browser session: one engine plus its pool of contexts.
//!
//! Sessions are created by [`Session::launch`] and destroyed by
//! [`Session::teardown`]. The fetcher replaces its session wholesale when the
//! page budget runs out; see [`crate::fetcher::PageFetcher::recycle`].

use crate::browser::pool::ContextPool;
use crate::browser::{BrowserPage, Engine, Launcher};
use crate::error::FetchError;
use crate::fetcher::FetchSettings;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

pub struct Session<E: Engine> {
    engine: E,
    pool: ContextPool<E::Context>,
}

impl<E: Engine> Session<E> {
    /// Start an engine and pre-create `pool_size` contexts for reuse.
    ///
    /// If any context fails to open, everything created so far is released
    /// before the error is returned.
    #[instrument(level = "info", skip(launcher))]
    pub async fn launch<L>(launcher: &L, pool_size: usize) -> Result<Self, FetchError>
    where
        L: Launcher<Engine = E>,
    {
        let engine = launcher.launch().await?;
        let mut contexts = Vec::with_capacity(pool_size);
        for _ in 0..pool_size.max(1) {
            match engine.new_context().await {
                Ok(ctx) => contexts.push(ctx),
                Err(e) => {
                    warn!(error = %e, created = contexts.len(), "Context creation failed; aborting launch");
                    Self {
                        engine,
                        pool: ContextPool::new(contexts),
                    }
                    .teardown()
                    .await;
                    return Err(e);
                }
            }
        }
        info!(contexts = contexts.len(), "Created browser contexts for reuse");
        Ok(Self {
            engine,
            pool: ContextPool::new(contexts),
        })
    }

    /// Load `url` in a fresh page and return the rendered HTML.
    ///
    /// The page is closed on every exit path; the context goes back to the
    /// pool when the guard drops.
    pub async fn load(&self, url: &str, settings: &FetchSettings) -> Result<String, FetchError> {
        let context = self.pool.acquire().await?;
        let page = self.engine.open_page(context.get()).await?;
        let result = render(&page, url, settings).await;
        if let Err(e) = page.close().await {
            warn!(%url, error = %e, "Closing page failed");
        }
        result
    }

    /// Close every context, then the engine. Errors are logged and ignored.
    pub async fn teardown(mut self) {
        let contexts = self.pool.drain();
        let count = contexts.len();
        for ctx in contexts {
            if let Err(e) = self.engine.close_context(ctx).await {
                warn!(error = %e, "Closing browser context failed; ignoring");
            }
        }
        if let Err(e) = self.engine.shutdown().await {
            warn!(error = %e, "Browser shutdown failed; ignoring");
        }
        debug!(contexts = count, "Session torn down");
    }
}

async fn render<P: BrowserPage>(
    page: &P,
    url: &str,
    settings: &FetchSettings,
) -> Result<String, FetchError> {
    timeout(settings.navigation_timeout, page.navigate(url))
        .await
        .map_err(|_| FetchError::NavigationTimeout {
            url: url.to_string(),
            timeout: settings.navigation_timeout,
        })??;

    timeout(
        settings.readiness_timeout,
        page.wait_for(&settings.readiness_selector),
    )
    .await
    .map_err(|_| FetchError::ReadinessTimeout {
        url: url.to_string(),
        selector: settings.readiness_selector.clone(),
        timeout: settings.readiness_timeout,
    })??;

    page.content().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::scripted::{Script, ScriptStats, ScriptedLauncher, article_html};
    use std::time::Duration;

    fn settings() -> FetchSettings {
        FetchSettings {
            navigation_timeout: Duration::from_millis(50),
            readiness_timeout: Duration::from_millis(50),
            ..FetchSettings::for_tests(2)
        }
    }

    #[tokio::test]
    async fn test_load_returns_rendered_html_and_closes_page() {
        let launcher = ScriptedLauncher::new([(
            "https://x/1".to_string(),
            Script::Html(article_html("One", "body")),
        )]);
        let session = Session::launch(&launcher, 2).await.unwrap();
        let html = session.load("https://x/1", &settings()).await.unwrap();
        assert!(html.contains("<h1>One</h1>"));
        assert_eq!(ScriptStats::get(&launcher.stats.pages_closed), 1);
        assert_eq!(session.pool.available(), 2);
    }

    #[tokio::test]
    async fn test_timeouts_surface_and_page_still_closed() {
        let launcher = ScriptedLauncher::new([
            ("https://x/hang".to_string(), Script::Hang),
            (
                "https://x/empty".to_string(),
                Script::Html("<html><body>nothing</body></html>".into()),
            ),
        ]);
        let session = Session::launch(&launcher, 1).await.unwrap();

        let err = session.load("https://x/hang", &settings()).await.unwrap_err();
        assert!(matches!(err, FetchError::NavigationTimeout { .. }));

        let err = session.load("https://x/empty", &settings()).await.unwrap_err();
        assert!(matches!(err, FetchError::ReadinessTimeout { .. }));

        assert_eq!(ScriptStats::get(&launcher.stats.pages_closed), 2);
        assert_eq!(session.pool.available(), 1);
    }

    #[tokio::test]
    async fn test_teardown_closes_contexts_and_engine() {
        let launcher = ScriptedLauncher::default();
        let session = Session::launch(&launcher, 3).await.unwrap();
        assert_eq!(session.pool.available(), 3);
        session.teardown().await;
        assert_eq!(ScriptStats::get(&launcher.stats.contexts_closed), 3);
        assert_eq!(ScriptStats::get(&launcher.stats.shutdowns), 1);
    }
}
