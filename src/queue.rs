// src/queue.rs

// bounded waiting line and the items it holds

// dependencies
use crate::errors::{FluxThrottleError, RequestError};
use crate::flux_throttle::ErrorHandler;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::error::Error;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::error;

type Job = Box<dyn FnOnce(ErrorHandler) -> BoxFuture<'static, ()> + Send>;

/// One admitted request together with the channel that settles its caller.
///
/// The request's result type is erased so that requests of different types
/// can share one waiting line.
pub(crate) struct QueueItem {
    job: Job,
}

impl QueueItem {
    pub(crate) fn new<F, Fut, T, E>(work: F) -> (Self, PendingRequest<T, E>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let job: Job = Box::new(move |on_error: ErrorHandler| {
            async move {
                let outcome = work().await;
                if let Err(error) = &outcome {
                    report_failure(&on_error, error);
                }
                // a dropped receiver means the caller stopped waiting
                let _ = sender.send(outcome);
            }
            .boxed()
        });

        (Self { job }, PendingRequest { receiver })
    }

    /// Execute the request and settle the caller's pending result.
    pub(crate) fn run(self, on_error: ErrorHandler) -> BoxFuture<'static, ()> {
        (self.job)(on_error)
    }
}

fn report_failure(on_error: &ErrorHandler, error: &(dyn Error + Send + Sync + 'static)) {
    if panic::catch_unwind(AssertUnwindSafe(|| on_error(error))).is_err() {
        error!(%error, "error handler panicked while reporting a failed request");
    }
}

/// The eventual outcome of a request admitted by the throttle.
///
/// Resolves once the request has been released and has run to completion.
#[must_use = "a pending request does nothing unless awaited"]
#[derive(Debug)]
pub struct PendingRequest<T, E> {
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> Future for PendingRequest<T, E> {
    type Output = Result<T, RequestError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| match received {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(RequestError::Request(error)),
            Err(_) => Err(RequestError::Abandoned),
        })
    }
}

/// FIFO of admitted requests, capacity-limited.
pub(crate) struct WaitingLine {
    items: VecDeque<QueueItem>,
    capacity: usize,
}

impl WaitingLine {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Append to the back of the line, refusing when at capacity.
    pub(crate) fn try_push(&mut self, item: QueueItem) -> Result<(), FluxThrottleError> {
        if self.is_full() {
            return Err(FluxThrottleError::QueueFull {
                max_queue_size: self.capacity,
            });
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Take the oldest item.
    pub(crate) fn pop_front(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }
}
