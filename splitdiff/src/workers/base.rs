use std::future::Future;

use crate::error::DiffResult;

/// A trait for types that can be started as workers.
///
/// The generic parameter `H` represents the handle type returned when the worker starts, and
/// `S` represents the state type that can be read through the handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error type.
    type Error;

    /// Starts the worker in the background and returns a handle to it.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// A handle to a running worker that provides access to its state and its outcome.
pub trait WorkerHandle<S> {
    /// Value the worker produces once it completed.
    type Output;

    /// Returns the current state of the worker.
    ///
    /// The state is shared with the worker, so it can be read at any time, also after the
    /// worker completed.
    fn state(&self) -> S;

    /// Returns a future that resolves when the worker completes.
    ///
    /// Fails only if the worker task itself could not be joined, e.g. because it panicked.
    fn wait(self) -> impl Future<Output = DiffResult<Self::Output>> + Send;
}
