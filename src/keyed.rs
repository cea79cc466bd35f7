// src/keyed.rs

// one throttle per key, created on demand

// dependencies
use crate::clock::{Clock, SystemClock};
use crate::config::FluxThrottleConfig;
use crate::errors::{FluxThrottleError, RequestError};
use crate::flux_throttle::{ErrorHandler, FluxThrottle, ThrottleStatus, default_error_handler};
use crate::queue::PendingRequest;
use dashmap::DashMap;
use std::error::Error;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

/// A set of independent throttles, one per key (for example one per
/// upstream host), sharing a configuration, a clock and an error handler.
/// K is the type used to identify throttles (e.g., String, u64, etc.).
/// We use `Arc<DashMap>` for concurrent access to the per-key throttles.
pub struct KeyedFluxThrottle<K, C = SystemClock>
where
    K: Hash + Eq,
    C: Clock + Clone,
{
    config: FluxThrottleConfig,
    clock: C,
    on_error: ErrorHandler,
    throttles: Arc<DashMap<K, FluxThrottle<C>>>,
}

impl<K, C> KeyedFluxThrottle<K, C>
where
    K: Hash + Eq,
    C: Clock + Clone + 'static,
{
    pub fn with_config(config: FluxThrottleConfig, clock: C) -> Result<Self, FluxThrottleError> {
        Self::with_shared_handler(config, clock, default_error_handler())
    }

    pub fn with_error_handler<H>(
        config: FluxThrottleConfig,
        clock: C,
        handler: H,
    ) -> Result<Self, FluxThrottleError>
    where
        H: Fn(&(dyn Error + Send + Sync + 'static)) + Send + Sync + 'static,
    {
        Self::with_shared_handler(config, clock, Arc::new(handler))
    }

    fn with_shared_handler(
        config: FluxThrottleConfig,
        clock: C,
        on_error: ErrorHandler,
    ) -> Result<Self, FluxThrottleError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            on_error,
            throttles: Arc::new(DashMap::new()),
        })
    }

    // fetch the key's throttle, creating it with full budgets on first use
    fn throttle_for(&self, key: K) -> Result<FluxThrottle<C>, FluxThrottleError> {
        if let Some(throttle) = self.throttles.get(&key) {
            return Ok(throttle.value().clone());
        }
        let entry = self.throttles.entry(key).or_try_insert_with(|| {
            FluxThrottle::with_shared_handler(
                self.config.clone(),
                self.clock.clone(),
                Arc::clone(&self.on_error),
            )
        })?;
        Ok(entry.value().clone())
    }

    /// Admit `work` on the throttle for `key`.
    pub async fn submit<F, Fut, T, E>(
        &self,
        key: K,
        work: F,
    ) -> Result<PendingRequest<T, E>, FluxThrottleError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        self.throttle_for(key)?.submit(work).await
    }

    /// Run `work` on the throttle for `key` and wait for its outcome.
    pub async fn add_request<F, Fut, T, E>(&self, key: K, work: F) -> Result<T, RequestError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let pending = self.submit(key, work).await?;
        pending.await
    }

    /// Status of the throttle for `key`, if one exists.
    pub async fn status(&self, key: &K) -> Option<ThrottleStatus> {
        let throttle = self.throttles.get(key).map(|entry| entry.value().clone())?;
        Some(throttle.status().await)
    }

    pub fn len(&self) -> usize {
        self.throttles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.throttles.is_empty()
    }

    /// Drop throttles with nothing queued, no drain loop, no caller holding
    /// them, and budgets that have fully recovered, so that recreating one
    /// later grants no more than the configured rate. Returns how many were
    /// removed.
    ///
    /// Each check runs under the map's shard lock, so no caller can pick up
    /// a throttle between the check and its removal.
    pub fn cleanup_idle(&self) -> Result<usize, FluxThrottleError> {
        let now = self.clock.now()?;
        let before = self.throttles.len();
        self.throttles
            .retain(|_, throttle| !throttle.is_idle_at(now));
        let removed = before.saturating_sub(self.throttles.len());
        debug!(removed, remaining = self.throttles.len(), "cleaned up idle throttles");
        Ok(removed)
    }
}
