// src/errors.rs

// error handling for the flux throttle

// dependencies
use crate::clock::ClockError;

/// Error type for throttle configuration and admission issues.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FluxThrottleError {
    #[error("max_per_second must be positive")]
    InvalidMaxPerSecond,
    #[error("max_per_minute must be positive")]
    InvalidMaxPerMinute,
    #[error("max_per_second ({per_second}) must not exceed max_per_minute ({per_minute})")]
    PerSecondExceedsPerMinute { per_second: u64, per_minute: u64 },
    #[error("max_queue_size must be positive")]
    InvalidQueueSize,
    #[error("process_interval must be non-zero")]
    InvalidProcessInterval,
    #[error("waiting line is full ({max_queue_size} requests pending)")]
    QueueFull { max_queue_size: usize },
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),
}

impl FluxThrottleError {
    /// True for the configuration validation failures raised at construction.
    pub fn is_invalid_options(&self) -> bool {
        matches!(
            self,
            Self::InvalidMaxPerSecond
                | Self::InvalidMaxPerMinute
                | Self::PerSecondExceedsPerMinute { .. }
                | Self::InvalidQueueSize
                | Self::InvalidProcessInterval
        )
    }

    pub fn is_queue_full(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }
}

/// Outcome of a failed throttled request.
///
/// `E` is the error type of the caller's own work, handed back unmodified.
#[derive(Debug, thiserror::Error)]
pub enum RequestError<E> {
    /// The throttle refused the request before it ran.
    #[error(transparent)]
    Throttle(#[from] FluxThrottleError),
    /// The request ran and failed.
    #[error("request failed: {0}")]
    Request(E),
    /// The request was dropped before it settled (for example it panicked).
    #[error("request was abandoned before it settled")]
    Abandoned,
}

impl<E> RequestError<E> {
    /// Returns the caller's original error, if the request itself failed.
    pub fn into_request_error(self) -> Option<E> {
        match self {
            Self::Request(error) => Some(error),
            _ => None,
        }
    }
}
