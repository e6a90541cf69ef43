//! Results that may or may not be available immediately.
//!
//! Both the wrapped operation and the decider hand their result back as a
//! [`MaybeAsync`]: either ready right away, or deferred behind an [`Awaitable`].
//! Any `Future` is an awaitable; other types can opt in by implementing the trait.

use futures::future::BoxFuture;
use std::future::Future;

/// A value exposing a continuation hook.
///
/// `subscribe` hands back the future that eventually yields the value. It may
/// fail, in which case the run is rejected with that error and nothing is retried.
pub trait Awaitable<T, E>: Send {
    fn subscribe(self: Box<Self>) -> Result<BoxFuture<'static, T>, E>;
}

impl<F, T, E> Awaitable<T, E> for F
where
    F: Future<Output = T> + Send + 'static,
{
    fn subscribe(self: Box<Self>) -> Result<BoxFuture<'static, T>, E> {
        Ok(Box::pin(*self))
    }
}

/// Result of an operation or decider call.
pub enum MaybeAsync<T, E> {
    /// Settled synchronously
    Ready(Result<T, E>),
    /// Settles later
    Deferred(Box<dyn Awaitable<Result<T, E>, E>>),
}

impl<T, E> MaybeAsync<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn ok(value: T) -> Self {
        MaybeAsync::Ready(Ok(value))
    }

    pub fn err(error: E) -> Self {
        MaybeAsync::Ready(Err(error))
    }

    /// Defer to a future
    pub fn future<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        MaybeAsync::Deferred(Box::new(fut))
    }

    /// Defer to a custom awaitable
    pub fn awaitable<A>(awaitable: A) -> Self
    where
        A: Awaitable<Result<T, E>, E> + 'static,
    {
        MaybeAsync::Deferred(Box::new(awaitable))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, MaybeAsync::Ready(_))
    }

    /// Wait for the result.
    ///
    /// The outer error is a failure to subscribe to the awaitable, the inner
    /// result is what the call itself produced. Ready values do not yield.
    pub(crate) async fn settle(self) -> Result<Result<T, E>, E> {
        match self {
            MaybeAsync::Ready(r) => Ok(r),
            MaybeAsync::Deferred(awaitable) => Ok(awaitable.subscribe()?.await),
        }
    }
}

impl<T, E> From<Result<T, E>> for MaybeAsync<T, E> {
    fn from(value: Result<T, E>) -> Self {
        MaybeAsync::Ready(value)
    }
}
