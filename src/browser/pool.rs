//! Fixed-size pool of browsing contexts.
//!
//! Contexts live in a queue of available entries. [`ContextPool::acquire`]
//! waits on a semaphore sized to the pool, pops the front context, and hands
//! out a guard; dropping the guard pushes the context onto the back. Any free
//! context may be chosen, and busy ones are never handed out twice.

use crate::error::FetchError;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};

pub struct ContextPool<C> {
    available: Mutex<VecDeque<C>>,
    permits: Semaphore,
}

impl<C> ContextPool<C> {
    pub fn new(contexts: Vec<C>) -> Self {
        Self {
            permits: Semaphore::new(contexts.len()),
            available: Mutex::new(contexts.into()),
        }
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    /// Borrow a free context until the returned guard is dropped.
    pub async fn acquire(&self) -> Result<PooledContext<'_, C>, FetchError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::PoolClosed)?;
        let context = self.lock().pop_front().ok_or(FetchError::PoolClosed)?;
        Ok(PooledContext {
            pool: self,
            context: Some(context),
            _permit: permit,
        })
    }

    /// Close the pool and take every context out of it.
    ///
    /// Needs `&mut self`, so no guard can be outstanding.
    pub fn drain(&mut self) -> Vec<C> {
        self.permits.close();
        self.lock().drain(..).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<C>> {
        self.available.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A context on loan from a [`ContextPool`].
pub struct PooledContext<'a, C> {
    pool: &'a ContextPool<C>,
    context: Option<C>,
    _permit: SemaphorePermit<'a>,
}

impl<C> PooledContext<'_, C> {
    pub fn get(&self) -> &C {
        // Only `drop` takes the context out.
        self.context.as_ref().expect("pooled context present until drop")
    }
}

impl<C> Drop for PooledContext<'_, C> {
    fn drop(&mut self) {
        if let Some(ctx) = self.context.take() {
            self.pool.lock().push_back(ctx);
        }
    }
}
