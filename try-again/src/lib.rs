//! Retry engine with pluggable deciders, execution history and cooperative cancellation.
//!
//! An operation is wrapped with [`wrap`] and configured either with [`Options`]
//! (exponential backoff via the [`DefaultDecider`]) or with a custom [`Decider`].
//! The resulting [`Retryable`] starts an independent run on every
//! [`call`](Retryable::call):
//!
//! 1. the operation is invoked and its result, immediate or deferred, is recorded
//!    in the run's [`ExecutionLog`]
//! 2. the decider inspects the log and returns a [`Decision`]
//! 3. the run either retries after a delay, rejects or resolves
//!
//! A run can be aborted at any time through [`Retryable::abort`] or an external
//! [`AbortSignal`] such as [`AbortController`].
//!
//! # Options
//!
//! ```ignore
//! use try_again::{MaybeAsync, Options, wrap};
//!
//! let lookup = wrap(|host: String| MaybeAsync::future(resolve(host)))
//!     .with_options(Options::default().with_retries(5).with_total_timeout(10_000));
//! let addr = lookup.call("example.com".into()).await?;
//! println!("took {} attempts", lookup.executions().len());
//! ```
//!
//! # Custom decider
//!
//! ```ignore
//! use try_again::{Decision, MaybeAsync, Run, wrap};
//!
//! let fetch = wrap(|id: u64| MaybeAsync::future(fetch_item(id))).with_decider(
//!     |run: &Run<u64, Item, ApiError>| {
//!         let last = run.executions().last().unwrap();
//!         MaybeAsync::ok(match last.outcome {
//!             Ok(item) => Decision::Return(item),
//!             Err(ApiError::NotFound) => Decision::try_again_with(last.args + 1),
//!             Err(e) => Decision::Stop(e),
//!         })
//!     },
//!     None,
//! );
//! ```

mod awaitable;
mod backoff;
mod controller;
mod decision;
mod engine;
mod error;
mod record;
mod signal;

pub use awaitable::{Awaitable, MaybeAsync};
pub use backoff::{Options, next_delay};
pub use decision::{Decider, Decision, DefaultDecider};
pub use engine::{Builder, Operation, Retryable, Run, RunFuture, wrap};
pub use error::RetryError;
pub use record::{ExecutionLog, ExecutionRecord};
pub use signal::{AbortController, AbortListener, AbortReason, AbortSignal, Subscription};
