//! Listener-based task capability.
//!
//! Storage SDKs hand back a task object for every operation and report its
//! outcome through registered listeners. `StorageTask` is the minimal
//! surface the stream adapters need from such an object.

/// Listener invoked with the value of a successful task.
pub type SuccessListener<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Listener invoked with the error of a failed task.
pub type FailureListener<E> = Box<dyn FnOnce(E) + Send + 'static>;

/// Listener invoked once the task reaches any terminal state.
pub type CompleteListener = Box<dyn FnOnce() + Send + 'static>;

/// An asynchronous storage operation that reports through listeners.
///
/// Implementations must honour these rules:
/// - A task finishes at most once, either with a value or with an error.
/// - Completion listeners run after every success or failure listener that
///   was registered before them.
/// - Listeners added after the task finished run immediately on the
///   registering thread.
pub trait StorageTask<T>: Send + 'static {
    /// Error reported to failure listeners.
    type Error: Send + 'static;

    /// Register a listener for the success value.
    ///
    /// # Arguments
    /// * `listener` - Called with the produced value
    fn add_on_success_listener(&mut self, listener: SuccessListener<T>) -> &mut Self;

    /// Register a listener for the failure error.
    ///
    /// # Arguments
    /// * `listener` - Called with the error the task failed with
    fn add_on_failure_listener(&mut self, listener: FailureListener<Self::Error>) -> &mut Self;

    /// Register a listener for the terminal event, successful or not.
    ///
    /// # Arguments
    /// * `listener` - Called once the task has finished
    fn add_on_complete_listener(&mut self, listener: CompleteListener) -> &mut Self;

    /// Whether the task has finished.
    fn is_complete(&self) -> bool;

    /// Attempt to cancel the task.
    ///
    /// # Returns
    /// `true` if the task was still running and is now cancelled. Tasks that
    /// cannot be cancelled keep the default, which always returns `false`.
    fn cancel(&self) -> bool {
        false
    }
}
