// src/lib.rs

//! # Flux Throttle
//!
//! An in-process async request throttle. Work is admitted into a bounded
//! waiting line and released so that no more than `max_per_second` requests
//! run per processing interval and no more than `max_per_minute` run per
//! minute. Work submitted to a full line is refused straight away.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use flux_throttle::{FluxThrottle, FluxThrottleConfig, SystemClock};
//!
//! # async fn fetch(id: u32) -> Result<String, std::io::Error> { Ok(id.to_string()) }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FluxThrottleConfig::new(10, 300, 1_000);
//! let throttle = FluxThrottle::with_config(config, SystemClock)?;
//!
//! let body = throttle.add_request(|| fetch(7)).await?;
//! println!("{body}");
//!
//! let status = throttle.status().await;
//! println!("{} waiting, {} available", status.queue_size, status.available_requests);
//! # Ok(())
//! # }
//! ```

// private modules
mod budget;
mod clock;
mod config;
mod errors;
mod flux_throttle;
mod keyed;
mod queue;

// public API exports
pub use clock::{Clock, ClockError, SystemClock};
pub use config::{
    DEFAULT_MAX_PER_MINUTE, DEFAULT_MAX_PER_SECOND, DEFAULT_MAX_QUEUE_SIZE,
    DEFAULT_PROCESS_INTERVAL, FluxThrottleConfig, RefillPolicy,
};
pub use errors::{FluxThrottleError, RequestError};
pub use flux_throttle::{ErrorHandler, FluxThrottle, ThrottleStatus, default_error_handler};
pub use keyed::KeyedFluxThrottle;
pub use queue::PendingRequest;
