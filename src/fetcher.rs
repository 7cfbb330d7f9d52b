//! Page fetcher: bounded-concurrency page loads over a recyclable session.
//!
//! # Concurrency
//!
//! Every [`PageFetcher::fetch`] first takes one of `concurrency` slots, so no
//! matter how many tasks are queued, at most `concurrency` pages are between
//! navigation and content capture at once.
//!
//! # Recycling
//!
//! Long-lived browser engines leak memory across thousands of page loads.
//! Every fetch (success or failure) bumps a page counter while it still holds
//! the session shared. Once the counter reaches `pages_before_restart`, the
//! fetch that crossed it, still holding its slot, takes the session exclusively,
//! which waits for every in-flight page to finish, then tears the session
//! down and launches a new one. A second fetch that crossed the budget at the
//! same time finds the counter already reset and does nothing.

use crate::browser::Launcher;
use crate::error::FetchError;
use crate::session::Session;
use rand::{Rng, rng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, Semaphore};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Knobs for page loading.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Simultaneous page loads; also the context pool size.
    pub concurrency: usize,
    /// Pages per session before a recycle. `0` disables recycling.
    pub pages_before_restart: usize,
    pub navigation_timeout: Duration,
    pub readiness_timeout: Duration,
    /// Element whose presence means the page has rendered enough to extract.
    pub readiness_selector: String,
    /// Random delay window applied before each load, in milliseconds.
    pub jitter_ms: (u64, u64),
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            pages_before_restart: 1_500,
            navigation_timeout: Duration::from_secs(30),
            readiness_timeout: Duration::from_secs(30),
            readiness_selector: "article".to_string(),
            jitter_ms: (50, 200),
        }
    }
}

#[cfg(test)]
impl FetchSettings {
    /// Fast settings: no jitter, short timeouts.
    pub fn for_tests(concurrency: usize) -> Self {
        Self {
            concurrency,
            navigation_timeout: Duration::from_millis(100),
            readiness_timeout: Duration::from_millis(100),
            jitter_ms: (0, 0),
            ..Self::default()
        }
    }
}

type SessionSlot<L> = Option<Session<<L as Launcher>::Engine>>;

pub struct PageFetcher<L: Launcher> {
    launcher: L,
    settings: FetchSettings,
    slots: Semaphore,
    session: RwLock<SessionSlot<L>>,
    pages_fetched: AtomicUsize,
    recycles: AtomicUsize,
}

impl<L: Launcher> PageFetcher<L> {
    /// Launch the first session and return a ready fetcher.
    pub async fn launch(launcher: L, settings: FetchSettings) -> Result<Self, FetchError> {
        let concurrency = settings.concurrency.max(1);
        let session = Session::launch(&launcher, concurrency).await?;
        Ok(Self {
            launcher,
            settings,
            slots: Semaphore::new(concurrency),
            session: RwLock::new(Some(session)),
            pages_fetched: AtomicUsize::new(0),
            recycles: AtomicUsize::new(0),
        })
    }

    /// Pages loaded by the current session.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched.load(Ordering::SeqCst)
    }

    /// Completed recycle operations since launch.
    pub fn recycles(&self) -> usize {
        self.recycles.load(Ordering::SeqCst)
    }

    /// Fetch one URL and return its rendered HTML.
    ///
    /// Never retries; a timeout or browser error is returned to the caller.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|_| FetchError::SlotsClosed)?;
        self.jitter().await;

        let result = {
            let session = self.session().await?;
            let result = match session.as_ref() {
                Some(s) => s.load(url, &self.settings).await,
                None => Err(FetchError::Launch("no browser session available".into())),
            };
            self.pages_fetched.fetch_add(1, Ordering::SeqCst);
            result
        };

        match &result {
            Ok(html) => debug!(%url, bytes = html.len(), "Fetched page"),
            Err(e) => warn!(%url, error = %e, "Failed to fetch page"),
        }

        if self.budget_spent() {
            self.recycle_if_due().await;
        }
        result
    }

    /// Tear down the session and launch a fresh one, resetting the page counter.
    ///
    /// Waits for in-flight page loads to finish first.
    #[cfg(test)]
    pub async fn recycle(&self) {
        let mut slot = self.session.write().await;
        self.recycle_locked(&mut slot).await;
    }

    /// Close the current session. The fetcher is unusable afterwards.
    pub async fn shutdown(self) {
        self.slots.close();
        if let Some(session) = self.session.into_inner() {
            session.teardown().await;
        }
    }

    fn budget_spent(&self) -> bool {
        let budget = self.settings.pages_before_restart;
        budget > 0 && self.pages_fetched() >= budget
    }

    async fn recycle_if_due(&self) {
        let mut slot = self.session.write().await;
        // Someone else may have recycled while we waited for the lock.
        if self.budget_spent() {
            self.recycle_locked(&mut slot).await;
        }
    }

    async fn recycle_locked(&self, slot: &mut SessionSlot<L>) {
        warn!(
            pages = self.pages_fetched(),
            "Restarting browser to release memory"
        );
        if let Some(old) = slot.take() {
            old.teardown().await;
        }
        self.pages_fetched.store(0, Ordering::SeqCst);
        self.recycles.fetch_add(1, Ordering::SeqCst);

        match Session::launch(&self.launcher, self.settings.concurrency.max(1)).await {
            Ok(fresh) => {
                *slot = Some(fresh);
                info!(recycles = self.recycles(), "Browser relaunched");
            }
            Err(e) => {
                error!(error = %e, "Browser relaunch failed; will retry on next fetch");
            }
        }
    }

    /// Shared access to the session, relaunching it first if a previous
    /// recycle left it empty.
    async fn session(&self) -> Result<RwLockReadGuard<'_, SessionSlot<L>>, FetchError> {
        {
            let guard = self.session.read().await;
            if guard.is_some() {
                return Ok(guard);
            }
        }
        let mut slot = self.session.write().await;
        if slot.is_none() {
            let fresh = Session::launch(&self.launcher, self.settings.concurrency.max(1)).await?;
            *slot = Some(fresh);
            self.pages_fetched.store(0, Ordering::SeqCst);
        }
        Ok(slot.downgrade())
    }

    async fn jitter(&self) {
        let (lo, hi) = self.settings.jitter_ms;
        if hi == 0 {
            return;
        }
        let ms = rng().random_range(lo.min(hi)..=hi);
        sleep(Duration::from_millis(ms)).await;
    }
}
