// tests/throttle/error_tests.rs

#[cfg(test)]
mod tests {
    use crate::fixtures::requests::{counting, failing, identity, settle};
    use crate::fixtures::test_clock::TestClock;
    use flux_throttle::{ClockError, FluxThrottle, FluxThrottleConfig, FluxThrottleError, RequestError};
    use std::error::Error;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[tokio::test(start_paused = true)]
    async fn request_failure_reaches_handler_and_caller_unmodified() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let throttle = FluxThrottle::with_error_handler(
            FluxThrottleConfig::new(2, 10, 5),
            TestClock::new(0.0),
            move |error: &(dyn Error + Send + Sync + 'static)| {
                sink.lock().unwrap().push(error.to_string());
            },
        )
        .unwrap();

        let result = throttle
            .add_request(|| async { Err::<u32, _>(io::Error::new(io::ErrorKind::TimedOut, "upstream timed out")) })
            .await;

        let error = result.unwrap_err().into_request_error().unwrap();
        assert_eq!(error.kind(), io::ErrorKind::TimedOut);
        assert_eq!(error.to_string(), "upstream timed out");
        assert_eq!(*seen.lock().unwrap(), vec!["upstream timed out".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_request_does_not_stall_the_line() {
        let throttle =
            FluxThrottle::with_config(FluxThrottleConfig::new(1, 10, 5), TestClock::new(0.0)).unwrap();

        let first = throttle.submit(identity(1)).await.unwrap();
        let second = throttle.submit(failing("bad gateway")).await.unwrap();
        let third = throttle.submit(identity(3)).await.unwrap();

        assert_eq!(first.await.unwrap(), 1);
        assert!(matches!(second.await, Err(RequestError::Request(_))));
        assert_eq!(third.await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_handler_does_not_break_the_drain_loop() {
        let throttle = FluxThrottle::with_error_handler(
            FluxThrottleConfig::new(1, 10, 5),
            TestClock::new(0.0),
            |_: &(dyn Error + Send + Sync + 'static)| panic!("handler failure"),
        )
        .unwrap();

        let _first = throttle.submit(identity(1)).await.unwrap();
        let second = throttle.submit(failing("refused")).await.unwrap();
        let third = throttle.submit(identity(3)).await.unwrap();

        let error = second.await.unwrap_err().into_request_error().unwrap();
        assert_eq!(error.to_string(), "refused");
        assert_eq!(third.await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_request_is_abandoned() {
        let throttle =
            FluxThrottle::with_config(FluxThrottleConfig::new(1, 10, 5), TestClock::new(0.0)).unwrap();

        let first = throttle
            .submit(|| async {
                if true {
                    panic!("request blew up");
                }
                Ok::<u32, io::Error>(0)
            })
            .await
            .unwrap();
        let second = throttle.submit(identity(2)).await.unwrap();

        assert!(matches!(first.await, Err(RequestError::Abandoned)));
        assert_eq!(second.await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_error_rejects_admission_without_queueing() {
        let clock = TestClock::new(0.0);
        let throttle =
            FluxThrottle::with_config(FluxThrottleConfig::new(2, 10, 5), clock.clone()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        clock.fail_next_call();
        let result = throttle.submit(counting(&counter)).await;
        assert!(matches!(
            result,
            Err(FluxThrottleError::Clock(ClockError::SystemTimeError))
        ));
        settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(throttle.status().await.mps_counter, 2);

        // the clock works again on the next call
        throttle.add_request(counting(&counter)).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clock_error_fails_construction() {
        let clock = TestClock::new(0.0);
        clock.fail_next_call();
        let result = FluxThrottle::with_config(FluxThrottleConfig::new(2, 10, 5), clock);
        assert!(matches!(result, Err(FluxThrottleError::Clock(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn clock_error_during_tick_skips_that_refill() {
        let clock = TestClock::new(0.0);
        let throttle =
            FluxThrottle::with_config(FluxThrottleConfig::new(1, 10, 5), clock.clone()).unwrap();

        let _first = throttle.submit(identity(1)).await.unwrap();
        let mut second = throttle.submit(identity(2)).await.unwrap();

        // the 1s tick cannot read the clock and releases nothing
        clock.fail_next_call();
        assert!(timeout(Duration::from_millis(1500), &mut second).await.is_err());
        assert_eq!(throttle.status().await.queue_size, 1);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(second.await.unwrap(), 2);
    }

    #[test]
    fn error_display_formatting() {
        let full = FluxThrottleError::QueueFull { max_queue_size: 3 };
        assert!(full.to_string().contains("full"));
        assert!(full.is_queue_full());
        assert!(!full.is_invalid_options());

        let invalid = FluxThrottleError::PerSecondExceedsPerMinute {
            per_second: 5,
            per_minute: 4,
        };
        assert!(invalid.to_string().contains("max_per_minute"));
        assert!(invalid.is_invalid_options());

        let clock: FluxThrottleError = ClockError::SystemTimeError.into();
        assert!(clock.to_string().to_lowercase().contains("clock"));

        let abandoned: RequestError<io::Error> = RequestError::Abandoned;
        assert!(!abandoned.to_string().is_empty());
        assert!(abandoned.into_request_error().is_none());
    }
}
