//! Bridging listener tasks into `futures` streams.
//!
//! Every storage operation follows the same template: start the task,
//! register success and failure listeners (plus a completion listener for
//! operations that terminate on completion), and forward what they report
//! into a channel. `bridge` is that template; `TaskStream` and `TaskSingle`
//! are the two shapes the result can take.
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use rx_storage::ops;
//!
//! let mut bytes = ops::get_bytes(&reference, 1024 * 1024);
//! while let Some(item) = bytes.next().await {
//!     let data: Vec<u8> = item?;
//! }
//! ```

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::future::FusedFuture;
use futures::stream::{FusedStream, Stream, StreamExt};
use futures::ready;
use tracing::{debug, warn};

use crate::task::StorageTask;

/// How a bridged stream reaches its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Emit the success value, then end when the task reports completion.
    OnComplete,
    /// The success value is itself the terminal event.
    OnSuccess,
}

/// A listener notification forwarded into a subscription.
#[derive(Debug)]
pub enum Signal<T, E> {
    /// The task succeeded with a value.
    Value(T),
    /// The task failed.
    Failed(E),
    /// The task reached its terminal state.
    Completed,
}

type CancelFn = Box<dyn FnOnce() -> bool + Send + 'static>;

/// Listeners wired onto one task, and the channel they report into.
pub struct Subscription<T, E> {
    signals: UnboundedReceiver<Signal<T, E>>,
    cancel: Option<CancelFn>,
}

impl<T, E> Subscription<T, E> {
    /// Ask the underlying task to cancel.
    ///
    /// # Returns
    /// Whatever the task reports; `false` if it was already asked.
    pub fn cancel(&mut self) -> bool {
        match self.cancel.take() {
            Some(cancel) => cancel(),
            None => false,
        }
    }
}

/// Register listeners on a task and collect their notifications.
///
/// # Arguments
/// * `task` - The task returned by a storage SDK call
/// * `termination` - Whether to also listen for completion
///
/// # Returns
/// A subscription that owns the task and receives its signals.
pub fn bridge<T, K>(mut task: K, termination: Termination) -> Subscription<T, K::Error>
where
    T: Send + 'static,
    K: StorageTask<T>,
{
    let (tx, rx) = mpsc::unbounded::<Signal<T, K::Error>>();

    let success_tx = tx.clone();
    let failure_tx = tx.clone();
    task.add_on_success_listener(Box::new(move |value| {
        let _ = success_tx.unbounded_send(Signal::Value(value));
    }))
    .add_on_failure_listener(Box::new(move |error| {
        let _ = failure_tx.unbounded_send(Signal::Failed(error));
    }));

    match termination {
        Termination::OnComplete => {
            task.add_on_complete_listener(Box::new(move || {
                let _ = tx.unbounded_send(Signal::Completed);
            }));
        }
        Termination::OnSuccess => drop(tx),
    }

    Subscription {
        signals: rx,
        cancel: Some(Box::new(move || task.cancel())),
    }
}

/// Deferred SDK call plus listener wiring, run on first poll.
pub type Subscribe<T, E> = Box<dyn FnOnce() -> Subscription<T, E> + Send + 'static>;

/// A stream shape that can be built from a deferred subscription.
pub trait TaskTarget<T, E>: Sized {
    /// The termination rule this shape needs.
    const TERMINATION: Termination;

    /// Build the shape around a subscription that has not started yet.
    fn from_subscribe(operation: &'static str, subscribe: Subscribe<T, E>) -> Self;
}

/// Adapt one SDK call into a stream shape.
///
/// The call is deferred until the result is first polled, and made exactly
/// once. Arguments captured by `call` reach the SDK unchanged.
///
/// # Arguments
/// * `operation` - Name used in log events
/// * `call` - Invokes the SDK and returns its task
pub fn from_task<T, K, S, F>(operation: &'static str, call: F) -> S
where
    T: Send + 'static,
    K: StorageTask<T>,
    S: TaskTarget<T, K::Error>,
    F: FnOnce() -> K + Send + 'static,
{
    S::from_subscribe(operation, Box::new(move || bridge(call(), S::TERMINATION)))
}

enum Phase<T, E> {
    Idle(Subscribe<T, E>),
    Active(Subscription<T, E>),
    /// The task dropped its listeners without a terminal event.
    Abandoned,
    Finished,
}

/// Shared state machine of both stream shapes.
struct Lazy<T, E> {
    operation: &'static str,
    phase: Phase<T, E>,
    cancel_on_drop: bool,
}

impl<T, E> Lazy<T, E> {
    fn new(operation: &'static str, subscribe: Subscribe<T, E>) -> Self {
        Self {
            operation,
            phase: Phase::Idle(subscribe),
            cancel_on_drop: false,
        }
    }

    /// Next signal, starting the subscription if needed.
    ///
    /// Returns `Ready(None)` only once finished; an abandoned subscription
    /// stays pending.
    fn poll_signal(&mut self, cx: &mut Context<'_>) -> Poll<Option<Signal<T, E>>> {
        if matches!(self.phase, Phase::Idle(_)) {
            if let Phase::Idle(subscribe) = mem::replace(&mut self.phase, Phase::Finished) {
                debug!(operation = self.operation, "subscribing to storage task");
                self.phase = Phase::Active(subscribe());
            }
        }

        match &mut self.phase {
            Phase::Active(subscription) => match ready!(subscription.signals.poll_next_unpin(cx)) {
                Some(signal) => Poll::Ready(Some(signal)),
                None => {
                    warn!(
                        operation = self.operation,
                        "storage task dropped its listeners without finishing"
                    );
                    self.phase = Phase::Abandoned;
                    Poll::Pending
                }
            },
            Phase::Abandoned => Poll::Pending,
            Phase::Finished => Poll::Ready(None),
            Phase::Idle(_) => Poll::Pending,
        }
    }

    fn finish(&mut self, outcome: &'static str) {
        debug!(operation = self.operation, outcome, "storage stream terminated");
        self.phase = Phase::Finished;
    }

    fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished)
    }
}

impl<T, E> Drop for Lazy<T, E> {
    fn drop(&mut self) {
        if !self.cancel_on_drop {
            return;
        }
        if let Phase::Active(subscription) = &mut self.phase {
            let cancelled: bool = subscription.cancel();
            debug!(
                operation = self.operation,
                cancelled, "storage stream dropped before terminating"
            );
        }
    }
}

// ============================================================================
// TaskStream
// ============================================================================

/// Stream of at most one value followed by a terminal event.
///
/// Yields `Ok(value)` when the task succeeds and ends when the task reports
/// completion. A failure yields `Err(error)` and ends the stream. The success
/// listener is `FnOnce`, so at most one value is ever yielded.
#[must_use = "streams do nothing unless polled"]
pub struct TaskStream<T, E> {
    lazy: Lazy<T, E>,
}

impl<T, E> Unpin for TaskStream<T, E> {}

impl<T, E> TaskStream<T, E> {
    /// Cancel the underlying task if this stream is dropped before it
    /// terminates. Off by default.
    pub fn cancel_on_drop(mut self) -> Self {
        self.lazy.cancel_on_drop = true;
        self
    }
}

impl<T, E> TaskTarget<T, E> for TaskStream<T, E> {
    const TERMINATION: Termination = Termination::OnComplete;

    fn from_subscribe(operation: &'static str, subscribe: Subscribe<T, E>) -> Self {
        Self {
            lazy: Lazy::new(operation, subscribe),
        }
    }
}

impl<T, E> Stream for TaskStream<T, E> {
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match ready!(this.lazy.poll_signal(cx)) {
            Some(Signal::Value(value)) => Poll::Ready(Some(Ok(value))),
            Some(Signal::Failed(error)) => {
                this.lazy.finish("failed");
                Poll::Ready(Some(Err(error)))
            }
            Some(Signal::Completed) => {
                this.lazy.finish("completed");
                Poll::Ready(None)
            }
            None => Poll::Ready(None),
        }
    }
}

impl<T, E> FusedStream for TaskStream<T, E> {
    fn is_terminated(&self) -> bool {
        self.lazy.is_finished()
    }
}

// ============================================================================
// TaskSingle
// ============================================================================

/// Future resolving with the single value of a task.
///
/// The success value is the terminal event; no completion listener is
/// registered.
#[must_use = "futures do nothing unless polled"]
pub struct TaskSingle<T, E> {
    lazy: Lazy<T, E>,
}

impl<T, E> Unpin for TaskSingle<T, E> {}

impl<T, E> TaskSingle<T, E> {
    /// Cancel the underlying task if this future is dropped before it
    /// resolves. Off by default.
    pub fn cancel_on_drop(mut self) -> Self {
        self.lazy.cancel_on_drop = true;
        self
    }
}

impl<T, E> TaskTarget<T, E> for TaskSingle<T, E> {
    const TERMINATION: Termination = Termination::OnSuccess;

    fn from_subscribe(operation: &'static str, subscribe: Subscribe<T, E>) -> Self {
        Self {
            lazy: Lazy::new(operation, subscribe),
        }
    }
}

impl<T, E> Future for TaskSingle<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match ready!(this.lazy.poll_signal(cx)) {
                Some(Signal::Value(value)) => {
                    this.lazy.finish("succeeded");
                    return Poll::Ready(Ok(value));
                }
                Some(Signal::Failed(error)) => {
                    this.lazy.finish("failed");
                    return Poll::Ready(Err(error));
                }
                Some(Signal::Completed) => continue,
                // Polled after resolving.
                None => return Poll::Pending,
            }
        }
    }
}

impl<T, E> FusedFuture for TaskSingle<T, E> {
    fn is_terminated(&self) -> bool {
        self.lazy.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future_task::FutureTask;
    use crate::StorageError;
    use futures::{poll, StreamExt};

    #[tokio::test]
    async fn test_ready_task_as_stream() {
        let stream: TaskStream<u32, StorageError> =
            from_task("test", || FutureTask::ready(Ok(3)));
        let items: Vec<Result<u32, StorageError>> = stream.collect().await;
        assert_eq!(items, vec![Ok(3)]);
    }

    #[tokio::test]
    async fn test_ready_task_as_single() {
        let single: TaskSingle<u32, StorageError> =
            from_task("test", || FutureTask::ready(Ok(3)));
        assert_eq!(single.await, Ok(3));
    }

    #[tokio::test]
    async fn test_failed_task_as_stream() {
        let stream: TaskStream<u32, StorageError> =
            from_task("test", || FutureTask::ready(Err(StorageError::Cancelled)));
        let items: Vec<Result<u32, StorageError>> = stream.collect().await;
        assert_eq!(items, vec![Err(StorageError::Cancelled)]);
    }

    #[tokio::test]
    async fn test_stream_is_fused_after_completion() {
        let mut stream: TaskStream<u32, StorageError> =
            from_task("test", || FutureTask::ready(Ok(3)));
        assert!(!stream.is_terminated());
        assert_eq!(stream.next().await, Some(Ok(3)));
        assert_eq!(stream.next().await, None);
        assert!(stream.is_terminated());
        assert_eq!(poll!(stream.next()), Poll::Ready(None));
    }

    #[test]
    fn test_termination_of_targets() {
        assert_eq!(
            <TaskStream<(), StorageError> as TaskTarget<(), StorageError>>::TERMINATION,
            Termination::OnComplete
        );
        assert_eq!(
            <TaskSingle<(), StorageError> as TaskTarget<(), StorageError>>::TERMINATION,
            Termination::OnSuccess
        );
    }
}
