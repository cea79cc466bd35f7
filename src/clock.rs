// src/clock.rs

// clock module definition and implementations

// dependencies
use std::time::{SystemTime, UNIX_EPOCH};

/// Clock trait to abstract time retrieval.
/// Implementors must be thread-safe (Send + Sync).
/// The `now` method returns the current time in nanoseconds as a u64.
/// The throttle only ever looks at the difference between two readings,
/// so any fixed origin works.
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<u64, ClockError>;
}

/// Clock error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("system time is before the unix epoch")]
    SystemTimeError,
}

/// SystemClock implementation using the system time.
/// Returns the current time in nanoseconds since the Unix epoch.
/// This is the default clock used by the throttle.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<u64, ClockError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .map_err(|_| ClockError::SystemTimeError)
    }
}
