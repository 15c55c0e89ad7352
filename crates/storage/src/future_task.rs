//! A `StorageTask` driven by a future on a tokio runtime.
//!
//! Backends in this workspace express each operation as an `async` block and
//! wrap it in a `FutureTask`, which gives it the listener surface that the
//! stream adapters subscribe to.

use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::task::{CompleteListener, FailureListener, StorageTask, SuccessListener};

/// Listener task over a spawned future.
///
/// The outcome is cloned once per listener, so any number of listeners can
/// observe it, before or after the future finished. Dropping the task does
/// not stop the future.
pub struct FutureTask<T> {
    shared: Arc<Shared<T>>,
    abort: Option<AbortHandle>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
}

struct State<T> {
    outcome: Option<Result<T, StorageError>>,
    /// Set once every success/failure listener has been dispatched.
    settled: bool,
    success: Vec<SuccessListener<T>>,
    failure: Vec<FailureListener<StorageError>>,
    complete: Vec<CompleteListener>,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        Self {
            outcome: None,
            settled: false,
            success: Vec::new(),
            failure: Vec::new(),
            complete: Vec::new(),
        }
    }
}

impl<T: Clone + Send + 'static> FutureTask<T> {
    /// Spawn a future and expose it as a listener task.
    ///
    /// # Arguments
    /// * `handle` - Runtime the future runs on
    /// * `future` - The storage operation
    pub fn spawn<F>(handle: &Handle, future: F) -> Self
    where
        F: Future<Output = Result<T, StorageError>> + Send + 'static,
    {
        let shared: Arc<Shared<T>> = Arc::new(Shared {
            state: Mutex::new(State::default()),
        });
        let join: JoinHandle<Result<T, StorageError>> = handle.spawn(future);
        let abort: AbortHandle = join.abort_handle();

        // A panicking or aborted future must still settle the listeners.
        let task_shared: Arc<Shared<T>> = shared.clone();
        handle.spawn(async move {
            let outcome: Result<T, StorageError> = match join.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Err(StorageError::Cancelled),
                Err(e) => {
                    warn!(error = %e, "storage task panicked");
                    Err(StorageError::Other {
                        message: format!("storage task panicked: {}", e),
                    })
                }
            };
            task_shared.finish(outcome);
        });

        Self {
            shared,
            abort: Some(abort),
        }
    }

    /// Create a task that has already finished.
    ///
    /// # Arguments
    /// * `outcome` - The result every listener will observe
    pub fn ready(outcome: Result<T, StorageError>) -> Self {
        let shared: Arc<Shared<T>> = Arc::new(Shared {
            state: Mutex::new(State::default()),
        });
        shared.finish(outcome);
        Self {
            shared,
            abort: None,
        }
    }
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Listeners never run under the lock, so a poisoned guard still holds
        // consistent state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the outcome and dispatch listeners.
    ///
    /// Returns `false` if the task had already finished.
    fn finish(&self, outcome: Result<T, StorageError>) -> bool {
        {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
        }

        loop {
            let (outcome, success, failure) = {
                let mut state = self.lock();
                if state.success.is_empty() && state.failure.is_empty() {
                    state.settled = true;
                    let complete: Vec<CompleteListener> = mem::take(&mut state.complete);
                    drop(state);
                    for listener in complete {
                        listener();
                    }
                    return true;
                }
                (
                    state.outcome.clone(),
                    mem::take(&mut state.success),
                    mem::take(&mut state.failure),
                )
            };

            match outcome {
                Some(Ok(value)) => {
                    for listener in success {
                        listener(value.clone());
                    }
                }
                Some(Err(error)) => {
                    for listener in failure {
                        listener(error.clone());
                    }
                }
                None => {}
            }
        }
    }
}

impl<T: Clone + Send + 'static> StorageTask<T> for FutureTask<T> {
    type Error = StorageError;

    fn add_on_success_listener(&mut self, listener: SuccessListener<T>) -> &mut Self {
        let mut state = self.shared.lock();
        if state.settled {
            let outcome: Option<Result<T, StorageError>> = state.outcome.clone();
            drop(state);
            if let Some(Ok(value)) = outcome {
                listener(value);
            }
        } else {
            state.success.push(listener);
            drop(state);
        }
        self
    }

    fn add_on_failure_listener(&mut self, listener: FailureListener<StorageError>) -> &mut Self {
        let mut state = self.shared.lock();
        if state.settled {
            let outcome: Option<Result<T, StorageError>> = state.outcome.clone();
            drop(state);
            if let Some(Err(error)) = outcome {
                listener(error);
            }
        } else {
            state.failure.push(listener);
            drop(state);
        }
        self
    }

    fn add_on_complete_listener(&mut self, listener: CompleteListener) -> &mut Self {
        let mut state = self.shared.lock();
        if state.settled {
            drop(state);
            listener();
        } else {
            state.complete.push(listener);
            drop(state);
        }
        self
    }

    fn is_complete(&self) -> bool {
        self.shared.lock().settled
    }

    fn cancel(&self) -> bool {
        let Some(abort) = &self.abort else {
            return false;
        };
        if self.shared.lock().outcome.is_some() {
            return false;
        }
        abort.abort();
        let cancelled: bool = self.shared.finish(Err(StorageError::Cancelled));
        if cancelled {
            debug!("storage task cancelled");
        }
        cancelled
    }
}
