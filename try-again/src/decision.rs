use crate::awaitable::MaybeAsync;
use crate::backoff::{Options, next_delay};
use crate::engine::Run;
use crate::record::ExecutionRecord;
use std::time::Duration;

/// Verdict of a [`Decider`] for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<A, T, E> {
    /// Run the operation again after `delay` (immediately if `None`),
    /// with `args` or the arguments the run was started with
    TryAgain {
        delay: Option<Duration>,
        args: Option<A>,
    },
    /// Reject the run with this error
    Stop(E),
    /// Resolve the run with this value
    Return(T),
}

impl<A, T, E> Decision<A, T, E> {
    /// Retry right away with the original arguments
    pub fn try_again() -> Self {
        Decision::TryAgain {
            delay: None,
            args: None,
        }
    }

    /// Retry with the original arguments after `delay`
    pub fn try_again_in(delay: Duration) -> Self {
        Decision::TryAgain {
            delay: Some(delay),
            args: None,
        }
    }

    /// Retry right away with `args`
    pub fn try_again_with(args: A) -> Self {
        Decision::TryAgain {
            delay: None,
            args: Some(args),
        }
    }

    pub fn is_try_again(&self) -> bool {
        matches!(self, Decision::TryAgain { .. })
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Decision::Stop(_))
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Decision::Return(_))
    }

    /// Requested delay of a [`Decision::TryAgain`]
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Decision::TryAgain { delay, .. } => *delay,
            _ => None,
        }
    }
}

// ─── Deciders ──────────────────────────────────────────────────────────────────

/// Decides what happens after each attempt.
///
/// Called with the [`Run`] once the attempt's record has been appended, so the
/// latest record is always the attempt being judged. The verdict can be returned
/// right away or deferred.
pub trait Decider<A, T, E>: Send + Sync {
    fn decide(&self, run: &Run<A, T, E>) -> MaybeAsync<Decision<A, T, E>, E>;
}

impl<F, A, T, E> Decider<A, T, E> for F
where
    F: Fn(&Run<A, T, E>) -> MaybeAsync<Decision<A, T, E>, E> + Send + Sync,
{
    fn decide(&self, run: &Run<A, T, E>) -> MaybeAsync<Decision<A, T, E>, E> {
        self(run)
    }
}

/// Exponential backoff decider built from [`Options`].
///
/// Returns after the first success, otherwise retries while [`next_delay`] allows
/// it and finally stops with the last attempt's error.
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    options: Options,
}

impl DefaultDecider {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn decide_from<A, T, E>(&self, records: &[ExecutionRecord<A, T, E>]) -> Decision<A, T, E>
    where
        T: Clone,
        E: Clone,
    {
        let Some(last) = records.last() else {
            // nothing attempted yet
            return Decision::try_again();
        };
        match &last.outcome {
            Ok(v) => Decision::Return(v.clone()),
            Err(e) => {
                let total_ns: u128 = records.iter().map(|r| r.duration().as_nanos()).sum();
                let total_ms = (total_ns / 1_000_000) as u64;
                match next_delay(total_ms, records.len() as u32, &self.options) {
                    Some(ms) => Decision::try_again_in(Duration::from_millis(ms)),
                    None => Decision::Stop(e.clone()),
                }
            }
        }
    }
}

impl<A, T, E> Decider<A, T, E> for DefaultDecider
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn decide(&self, run: &Run<A, T, E>) -> MaybeAsync<Decision<A, T, E>, E> {
        MaybeAsync::ok(run.executions().with_records(|r| self.decide_from(r)))
    }
}
