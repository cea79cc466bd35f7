// src/flux_throttle.rs

// flux-throttle: admission, drain loop and status of a dual-window throttle.

// dependencies
use crate::budget::DualWindowBudget;
use crate::clock::{Clock, SystemClock};
use crate::config::FluxThrottleConfig;
use crate::errors::{FluxThrottleError, RequestError};
use crate::queue::{PendingRequest, QueueItem, WaitingLine};
use futures::future::join_all;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Callback invoked with the error of every failed request before the
/// caller's pending result is rejected. It runs inside the drain loop and
/// must not block.
pub type ErrorHandler = Arc<dyn Fn(&(dyn Error + Send + Sync + 'static)) + Send + Sync>;

/// The handler used when none is supplied: logs the failure.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|error: &(dyn Error + Send + Sync + 'static)| {
        error!(%error, "throttled request failed");
    })
}

/// Point-in-time snapshot of a throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleStatus {
    /// Requests admitted but not yet released
    pub queue_size: usize,
    /// Requests that could be released right now
    pub available_requests: u64,
    /// Remaining permits in the per-second window
    pub mps_counter: u64,
    /// Remaining whole permits in the per-minute window
    pub mpm_counter: u64,
    /// Whether the drain loop is armed
    pub draining: bool,
}

/// The main throttle.
/// C is the clock type, defaulting to SystemClock.
/// Handles are cheap to clone and share one waiting line and one pair of
/// budgets. Requires a tokio runtime: admitted work and the drain loop are
/// spawned onto it.
pub struct FluxThrottle<C = SystemClock>
where
    C: Clock,
{
    inner: Arc<Inner<C>>,
}

struct Inner<C> {
    config: FluxThrottleConfig,
    clock: C,
    on_error: ErrorHandler,
    state: Mutex<ThrottleState>,
}

// everything behind the lock
struct ThrottleState {
    budget: DualWindowBudget,
    queue: WaitingLine,
    // the drain timer; `None` while idle
    drain: Option<JoinHandle<()>>,
}

impl ThrottleState {
    /// Pop as many items as the budget allows, spending one permit each.
    fn release_ready(&mut self) -> Vec<QueueItem> {
        let mut released = Vec::new();
        while !self.queue.is_empty() && self.budget.try_consume() {
            if let Some(item) = self.queue.pop_front() {
                released.push(item);
            }
        }
        released
    }
}

impl<C: Clock> Clone for FluxThrottle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// methods for the FluxThrottle type
impl<C> FluxThrottle<C>
where
    C: Clock + 'static,
{
    // method to create a new throttle from a config object, logging failures
    pub fn with_config(config: FluxThrottleConfig, clock: C) -> Result<Self, FluxThrottleError> {
        Self::with_shared_handler(config, clock, default_error_handler())
    }

    /// Create a throttle that reports failed requests to `handler`.
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

    pub(crate) fn with_shared_handler(
        config: FluxThrottleConfig,
        clock: C,
        on_error: ErrorHandler,
    ) -> Result<Self, FluxThrottleError> {
        config.validate()?;
        let now = clock.now()?;

        let state = ThrottleState {
            budget: DualWindowBudget::new(&config, now),
            queue: WaitingLine::new(config.max_queue_size),
            drain: None,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                clock,
                on_error,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &FluxThrottleConfig {
        &self.inner.config
    }

    /// Submit `work` and wait for its outcome.
    ///
    /// Fails with [`FluxThrottleError::QueueFull`] (wrapped in
    /// [`RequestError::Throttle`]) without running `work` when the waiting
    /// line is saturated. A failure of `work` itself comes back unmodified as
    /// [`RequestError::Request`].
    pub async fn add_request<F, Fut, T, E>(&self, work: F) -> Result<T, RequestError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let pending = self.submit(work).await?;
        pending.await
    }

    /// Admission step of [`add_request`](Self::add_request).
    ///
    /// Returns once `work` has been accepted or refused. Accepted work runs
    /// straight away if both budgets allow it, otherwise it waits in line for
    /// the drain loop. The returned handle resolves with the outcome.
    pub async fn submit<F, Fut, T, E>(
        &self,
        work: F,
    ) -> Result<PendingRequest<T, E>, FluxThrottleError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock().await;
        if state.queue.is_full() {
            let queue_size = state.queue.len();
            drop(state);
            warn!(queue_size, "rejecting request, waiting line is full");
            return Err(FluxThrottleError::QueueFull {
                max_queue_size: self.inner.config.max_queue_size,
            });
        }

        // a running drain loop owns the refill
        if state.drain.is_none() {
            let now = self.inner.clock.now()?;
            state.budget.catch_up(now);
        }

        let (item, pending) = QueueItem::new(work);
        state.queue.try_push(item)?;
        let released = state.release_ready();
        self.arm_drain(&mut state);
        self.inner.detach(released);

        Ok(pending)
    }

    /// Snapshot of the queue and both budgets. Does not refill anything.
    pub async fn status(&self) -> ThrottleStatus {
        let state = self.inner.state.lock().await;
        ThrottleStatus {
            queue_size: state.queue.len(),
            available_requests: state.budget.available(),
            mps_counter: state.budget.mps_counter(),
            mpm_counter: state.budget.mpm_floor(),
            draining: state.drain.is_some(),
        }
    }

    /// True when nothing is queued or draining, no other handle exists, and
    /// both budgets would be full at `now`. A throttle whose lock is held is
    /// reported busy.
    pub(crate) fn is_idle_at(&self, now: u64) -> bool {
        // callers mid-submit and the drain task each hold a reference
        if Arc::strong_count(&self.inner) > 1 {
            return false;
        }
        match self.inner.state.try_lock() {
            Ok(state) => {
                state.queue.is_empty()
                    && state.drain.is_none()
                    && state.budget.is_replenished(now)
            }
            Err(_) => false,
        }
    }

    // start the drain loop if work is waiting and no loop is running
    fn arm_drain(&self, state: &mut ThrottleState) {
        if state.queue.is_empty() || state.drain.is_some() {
            return;
        }
        debug!(queue_size = state.queue.len(), "arming drain loop");
        state.drain = Some(tokio::spawn(drain_loop(Arc::clone(&self.inner))));
    }
}

impl<C: Clock> Inner<C> {
    // spawn released items, keeping the handles so a tick can await them
    fn launch(&self, items: Vec<QueueItem>) -> Vec<JoinHandle<()>> {
        items
            .into_iter()
            .map(|item| tokio::spawn(item.run(Arc::clone(&self.on_error))))
            .collect()
    }

    // spawn released items whose outcome only their callers wait for
    fn detach(&self, items: Vec<QueueItem>) {
        for item in items {
            drop(tokio::spawn(item.run(Arc::clone(&self.on_error))));
        }
    }
}

/// Refill, release, repeat until the waiting line is empty.
///
/// The loop waits for every request released in a tick to settle before
/// looking at the line again. The decision to go idle is taken under the
/// same lock that admission uses to arm the loop.
async fn drain_loop<C: Clock + 'static>(inner: Arc<Inner<C>>) {
    let period = inner.config.process_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let released = {
            let mut state = inner.state.lock().await;
            match inner.clock.now() {
                Ok(now) => state.budget.refill_on_tick(now),
                Err(error) => warn!(%error, "skipping budget refill for this tick"),
            }
            let released = state.release_ready();
            debug!(
                released = released.len(),
                remaining = state.queue.len(),
                "drain tick"
            );
            released
        };

        join_all(inner.launch(released)).await;

        let mut state = inner.state.lock().await;
        if state.queue.is_empty() {
            state.drain = None;
            debug!("waiting line drained, drain loop going idle");
            return;
        }
    }
}
