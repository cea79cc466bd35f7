// src/budget.rs

// dual-window token counters

// dependencies
use crate::config::{FluxThrottleConfig, RefillPolicy};

const NANOS_PER_MINUTE: f64 = 60_000_000_000.0;

/// The per-second and per-minute budgets of one throttle.
///
/// All timestamps are clock readings in nanoseconds. Readings that go
/// backwards are treated as no elapsed time.
#[derive(Debug, Clone)]
pub(crate) struct DualWindowBudget {
    max_per_second: u64,
    max_per_minute: u64,
    interval_nanos: u64,
    policy: RefillPolicy,
    mps_counter: u64,
    mpm_counter: f64,
    // last time the per-second window was reset (or trickled)
    last_second_refill: u64,
    // last time the per-minute budget was credited
    last_minute_refill: u64,
}

impl DualWindowBudget {
    /// Both budgets start full.
    pub(crate) fn new(config: &FluxThrottleConfig, now: u64) -> Self {
        Self {
            max_per_second: config.max_per_second,
            max_per_minute: config.max_per_minute,
            interval_nanos: (config.process_interval.as_nanos() as u64).max(1),
            policy: config.refill_policy,
            mps_counter: config.max_per_second,
            mpm_counter: config.max_per_minute as f64,
            last_second_refill: now,
            last_minute_refill: now,
        }
    }

    /// Full refill applied by a drain tick.
    pub(crate) fn refill_on_tick(&mut self, now: u64) {
        match self.policy {
            RefillPolicy::ResetAndRefill => {
                self.mps_counter = self.max_per_second;
                self.refill_per_minute(now);
            }
            RefillPolicy::Trickle => {
                self.trickle(1);
                self.last_minute_refill = self.last_minute_refill.max(now);
            }
        }
        self.last_second_refill = self.last_second_refill.max(now);
    }

    /// Elapsed-time bookkeeping applied outside of ticks (at admission).
    ///
    /// The per-second window only recovers once a whole interval has passed
    /// since it was last refilled.
    pub(crate) fn catch_up(&mut self, now: u64) {
        let elapsed = now.saturating_sub(self.last_second_refill);
        let whole_intervals = elapsed / self.interval_nanos;

        match self.policy {
            RefillPolicy::ResetAndRefill => {
                if whole_intervals > 0 {
                    self.mps_counter = self.max_per_second;
                    self.last_second_refill = now;
                }
                self.refill_per_minute(now);
            }
            RefillPolicy::Trickle => {
                if whole_intervals > 0 {
                    self.trickle(whole_intervals);
                    self.last_second_refill += whole_intervals * self.interval_nanos;
                    self.last_minute_refill = self.last_second_refill;
                }
            }
        }
    }

    fn refill_per_minute(&mut self, now: u64) {
        let elapsed = now.saturating_sub(self.last_minute_refill);
        let credit = elapsed as f64 / NANOS_PER_MINUTE * self.max_per_minute as f64;
        self.mpm_counter = (self.mpm_counter + credit).min(self.max_per_minute as f64);
        self.last_minute_refill = self.last_minute_refill.max(now);
    }

    fn trickle(&mut self, ticks: u64) {
        self.mps_counter = self
            .mps_counter
            .saturating_add(ticks)
            .min(self.max_per_second);
        let credit = ticks as f64 * self.max_per_minute as f64 / 60.0;
        self.mpm_counter = (self.mpm_counter + credit).min(self.max_per_minute as f64);
    }

    /// Permits usable right now: `min(mps, floor(mpm))`.
    pub(crate) fn available(&self) -> u64 {
        self.mps_counter.min(self.mpm_floor())
    }

    /// Spend one permit from both windows. Returns false, spending nothing,
    /// when no permit is available.
    pub(crate) fn try_consume(&mut self) -> bool {
        if self.available() == 0 {
            return false;
        }
        self.mps_counter -= 1;
        self.mpm_counter -= 1.0;
        true
    }

    /// True when both windows would be at their ceilings at `now`.
    pub(crate) fn is_replenished(&self, now: u64) -> bool {
        let mut projected = self.clone();
        projected.catch_up(now);
        projected.mps_counter == projected.max_per_second
            && projected.mpm_counter >= projected.max_per_minute as f64
    }

    pub(crate) fn mps_counter(&self) -> u64 {
        self.mps_counter
    }

    pub(crate) fn mpm_floor(&self) -> u64 {
        self.mpm_counter.max(0.0).floor() as u64
    }

    #[cfg(test)]
    fn mpm_counter(&self) -> f64 {
        self.mpm_counter
    }
}
