// src/config.rs

//! Configuration types for the flux throttle

// dependencies
use crate::errors::FluxThrottleError;
use std::time::Duration;

/// Default ceiling for the per-second window.
pub const DEFAULT_MAX_PER_SECOND: u64 = 100;
/// Default ceiling for the per-minute window.
pub const DEFAULT_MAX_PER_MINUTE: u64 = 1000;
/// Default capacity of the waiting line.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;
/// Default cadence of the drain loop.
pub const DEFAULT_PROCESS_INTERVAL: Duration = Duration::from_millis(1000);

/// How the two budgets recover on every drain tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefillPolicy {
    /// The per-second budget is reset to its ceiling on every tick, the
    /// per-minute budget refills in proportion to the real time elapsed.
    #[default]
    ResetAndRefill,
    /// Each tick adds one permit to the per-second budget and a sixtieth of
    /// the ceiling to the per-minute budget, regardless of elapsed time.
    Trickle,
}

/// Configuration for throttle behavior
#[derive(Debug, Clone)]
pub struct FluxThrottleConfig {
    pub(crate) max_per_second: u64,
    pub(crate) max_per_minute: u64,
    pub(crate) max_queue_size: usize,
    pub(crate) process_interval: Duration,
    pub(crate) refill_policy: RefillPolicy,
}

impl Default for FluxThrottleConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_PER_SECOND,
            DEFAULT_MAX_PER_MINUTE,
            DEFAULT_MAX_QUEUE_SIZE,
        )
    }
}

impl FluxThrottleConfig {
    /// Create a new configuration with both ceilings and the queue capacity,
    /// using the default process interval and refill policy.
    pub fn new(max_per_second: u64, max_per_minute: u64, max_queue_size: usize) -> Self {
        Self {
            max_per_second,
            max_per_minute,
            max_queue_size,
            process_interval: DEFAULT_PROCESS_INTERVAL,
            refill_policy: RefillPolicy::default(),
        }
    }

    /// Builder-style: set the per-second ceiling
    pub fn per_second(mut self, max_per_second: u64) -> Self {
        self.max_per_second = max_per_second;
        self
    }

    /// Builder-style: set the per-minute ceiling
    pub fn per_minute(mut self, max_per_minute: u64) -> Self {
        self.max_per_minute = max_per_minute;
        self
    }

    /// Builder-style: set the waiting line capacity
    pub fn queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Builder-style: set the drain loop cadence
    pub fn process_interval(mut self, process_interval: Duration) -> Self {
        self.process_interval = process_interval;
        self
    }

    /// Builder-style: set the refill policy
    pub fn refill_policy(mut self, refill_policy: RefillPolicy) -> Self {
        self.refill_policy = refill_policy;
        self
    }

    pub fn max_per_second(&self) -> u64 {
        self.max_per_second
    }

    pub fn max_per_minute(&self) -> u64 {
        self.max_per_minute
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    pub fn interval(&self) -> Duration {
        self.process_interval
    }

    pub fn policy(&self) -> RefillPolicy {
        self.refill_policy
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), FluxThrottleError> {
        if self.max_per_second == 0 {
            return Err(FluxThrottleError::InvalidMaxPerSecond);
        }
        if self.max_per_minute == 0 {
            return Err(FluxThrottleError::InvalidMaxPerMinute);
        }
        if self.max_per_second > self.max_per_minute {
            return Err(FluxThrottleError::PerSecondExceedsPerMinute {
                per_second: self.max_per_second,
                per_minute: self.max_per_minute,
            });
        }
        if self.max_queue_size == 0 {
            return Err(FluxThrottleError::InvalidQueueSize);
        }
        if self.process_interval.is_zero() {
            return Err(FluxThrottleError::InvalidProcessInterval);
        }
        Ok(())
    }
}
