use crate::awaitable::MaybeAsync;
use crate::backoff::Options;
use crate::controller::{Phase, RunController};
use crate::decision::{Decider, Decision, DefaultDecider};
use crate::error::RetryError;
use crate::record::{ExecutionLog, ExecutionRecord};
use crate::signal::{AbortReason, AbortSignal};
use log::{debug, warn};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

// ─── Builder ──────────────────────────────────────────────────────────────────

/// The wrapped operation.
pub type Operation<A, T, E> = dyn Fn(A) -> MaybeAsync<T, E> + Send + Sync;

/// Wrap `operation` so it can be configured with a retry policy.
///
/// # Example
/// ```ignore
/// let fetch = try_again::wrap(|url: String| MaybeAsync::future(download(url)))
///     .with_options(Options::default().with_retries(5));
/// let body = fetch.call("https://example.com".into()).await?;
/// ```
pub fn wrap<A, T, E, F>(operation: F) -> Builder<A, T, E>
where
    F: Fn(A) -> MaybeAsync<T, E> + Send + Sync + 'static,
{
    Builder {
        operation: Arc::new(operation),
    }
}

/// Captures an operation until a decider is chosen.
pub struct Builder<A, T, E> {
    operation: Arc<Operation<A, T, E>>,
}

impl<A, T, E> Builder<A, T, E>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Retry with exponential backoff as described by `options`
    pub fn with_options(self, options: Options) -> Retryable<A, T, E> {
        let signal = options.signal.clone();
        self.with_decider(DefaultDecider::new(options), signal)
    }

    /// Retry as `decider` says, optionally cancelled by `signal`
    pub fn with_decider<D>(self, decider: D, signal: Option<Arc<dyn AbortSignal>>) -> Retryable<A, T, E>
    where
        D: Decider<A, T, E> + 'static,
    {
        Retryable {
            shared: Arc::new(Shared {
                operation: self.operation,
                decider: Arc::new(decider),
                signal,
                current: Mutex::new(Current {
                    log: ExecutionLog::new(),
                    controller: None,
                    pending_abort: None,
                }),
            }),
        }
    }
}

// ─── Retryable Handle ─────────────────────────────────────────────────────────

struct Current<A, T, E> {
    log: ExecutionLog<A, T, E>,
    controller: Option<Arc<RunController<A, T, E>>>,
    /// Abort requested before the first run
    pending_abort: Option<AbortReason>,
}

struct Shared<A, T, E> {
    operation: Arc<Operation<A, T, E>>,
    decider: Arc<dyn Decider<A, T, E>>,
    signal: Option<Arc<dyn AbortSignal>>,
    current: Mutex<Current<A, T, E>>,
}

/// A retrying version of an operation.
///
/// Every [`call`](Retryable::call) starts an independent run. [`executions`](Retryable::executions)
/// and [`abort`](Retryable::abort) always refer to the most recently started run.
/// Clones share the same state.
pub struct Retryable<A, T, E> {
    shared: Arc<Shared<A, T, E>>,
}

impl<A, T, E> Clone for Retryable<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<A, T, E> fmt::Debug for Retryable<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retryable")
            .field("signal", &self.shared.signal)
            .finish_non_exhaustive()
    }
}

impl<A, T, E> Retryable<A, T, E>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Start a run with `args`.
    ///
    /// The run is driven by a spawned task and makes progress whether or not the
    /// returned future is polled. Dropping the future does not stop it, use
    /// [`abort`](Retryable::abort) for that. Must be called within a tokio runtime.
    pub fn call(&self, args: A) -> RunFuture<T, E> {
        let log = ExecutionLog::new();
        let (controller, rx) = RunController::new(log.clone());
        let pending = {
            let mut current = self.current();
            current.log = log.clone();
            current.controller = Some(controller.clone());
            current.pending_abort.take()
        };

        if let Some(reason) = pending {
            controller.abort(reason);
            return RunFuture { rx, task: None };
        }

        if let Some(signal) = &self.shared.signal {
            if let Some(reason) = signal.reason() {
                debug!("Signal already aborted, not starting run");
                controller.abort(reason);
                return RunFuture { rx, task: None };
            }
            let weak = Arc::downgrade(&controller);
            let subscription = signal.subscribe(Box::new(move |reason| {
                if let Some(ctl) = weak.upgrade() {
                    ctl.abort(reason);
                }
            }));
            controller.attach(subscription);
            // fired between the check and the subscription
            if let Some(reason) = signal.reason() {
                controller.abort(reason);
                return RunFuture { rx, task: None };
            }
        }

        let engine = Engine {
            operation: self.shared.operation.clone(),
            decider: self.shared.decider.clone(),
            run: Run { controller },
            original: args,
        };
        let task = tokio::spawn(engine.drive());
        RunFuture {
            rx,
            task: Some(task),
        }
    }
}

impl<A, T, E> Retryable<A, T, E> {
    /// History of the most recent run, empty before the first call.
    ///
    /// The returned log is live: it keeps growing while that run is in progress.
    pub fn executions(&self) -> ExecutionLog<A, T, E> {
        self.current().log.clone()
    }

    /// Abort the most recent run.
    ///
    /// Before the first call the abort is remembered and the next run fails
    /// without invoking the operation. Aborting a settled run has no effect.
    pub fn abort(&self, reason: impl Into<AbortReason>) {
        let reason = reason.into();
        let controller = {
            let mut current = self.current();
            match &current.controller {
                Some(ctl) => ctl.clone(),
                None => {
                    current.pending_abort.get_or_insert(reason);
                    return;
                }
            }
        };
        controller.abort(reason);
    }

    fn current(&self) -> MutexGuard<'_, Current<A, T, E>> {
        self.shared.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ─── Run ──────────────────────────────────────────────────────────────────────

/// View of a single run, handed to the [`Decider`].
pub struct Run<A, T, E> {
    controller: Arc<RunController<A, T, E>>,
}

impl<A, T, E> Clone for Run<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
        }
    }
}

impl<A, T, E> Run<A, T, E> {
    /// Every attempt of this run so far, the one being judged last
    pub fn executions(&self) -> &ExecutionLog<A, T, E> {
        self.controller.log()
    }

    /// Number of attempts made so far
    pub fn attempts(&self) -> usize {
        self.executions().len()
    }

    pub fn abort(&self, reason: impl Into<AbortReason>) {
        self.controller.abort(reason.into());
    }

    pub fn is_aborted(&self) -> bool {
        self.controller.is_aborted()
    }
}

/// Resolves with the outcome of a run.
pub struct RunFuture<T, E> {
    rx: oneshot::Receiver<Result<T, RetryError<E>>>,
    task: Option<JoinHandle<()>>,
}

impl<T, E> Future for RunFuture<T, E> {
    type Output = Result<T, RetryError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match ready!(Pin::new(&mut this.rx).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(_) => {
                // the engine went away without settling
                if let Some(task) = this.task.as_mut() {
                    if let Err(e) = ready!(Pin::new(task).poll(cx)) {
                        if e.is_panic() {
                            std::panic::resume_unwind(e.into_panic());
                        }
                    }
                }
                Poll::Ready(Err(RetryError::Lost))
            }
        }
    }
}

// ─── Execution Loop ───────────────────────────────────────────────────────────

struct Engine<A, T, E> {
    operation: Arc<Operation<A, T, E>>,
    decider: Arc<dyn Decider<A, T, E>>,
    run: Run<A, T, E>,
    original: A,
}

impl<A, T, E> Engine<A, T, E>
where
    A: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn drive(self) {
        let ctl = self.run.controller.clone();
        let _close = CloseOnDrop(ctl.clone());
        let mut args = self.original.clone();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if !ctl.enter(Phase::Running) {
                return;
            }

            debug!("Starting attempt {}", attempt);
            let start_time = Instant::now();
            let outcome = match (self.operation)(args.clone()).settle().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Attempt {} could not be awaited, giving up", attempt);
                    ctl.settle(Err(RetryError::Protocol(e)));
                    return;
                }
            };
            let finish_time = Instant::now();
            debug!(
                "Attempt {} {} after {:?}",
                attempt,
                if outcome.is_ok() { "succeeded" } else { "failed" },
                finish_time - start_time
            );

            if !ctl.record(ExecutionRecord::new(args, start_time, finish_time, outcome)) {
                debug!("Run aborted during attempt {}", attempt);
                return;
            }

            let decision = match self.decider.decide(&self.run).settle().await {
                Ok(Ok(decision)) => decision,
                Ok(Err(e)) | Err(e) => {
                    warn!("Decider failed after attempt {}, giving up", attempt);
                    ctl.settle(Err(RetryError::Protocol(e)));
                    return;
                }
            };
            if !ctl.decided(decision.clone()) {
                debug!("Run aborted while deciding on attempt {}", attempt);
                return;
            }

            match decision {
                Decision::TryAgain { delay, args: next } => {
                    let delay = delay.unwrap_or_default();
                    warn!("Attempt {} will be retried in {:?}", attempt, delay);
                    tokio::select! {
                        biased;
                        _ = ctl.timer_cancelled() => return,
                        _ = sleep(delay) => {}
                    }
                    args = next.unwrap_or_else(|| self.original.clone());
                }
                Decision::Stop(e) => {
                    debug!("Stopping after attempt {}", attempt);
                    ctl.settle(Err(RetryError::Stopped(e)));
                    return;
                }
                Decision::Return(v) => {
                    debug!("Returning after attempt {}", attempt);
                    ctl.settle(Ok(v));
                    return;
                }
            }
        }
    }
}

/// Closes a run whose engine stopped without settling it, e.g. after a panic
struct CloseOnDrop<A, T, E>(Arc<RunController<A, T, E>>);

impl<A, T, E> Drop for CloseOnDrop<A, T, E> {
    fn drop(&mut self) {
        self.0.close();
    }
}
