use crate::decision::Decision;
use crate::error::RetryError;
use crate::record::{ExecutionLog, ExecutionRecord};
use crate::signal::{AbortReason, Subscription};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Where the engine currently is within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    /// Waiting for the operation
    Running,
    /// Record appended, waiting for the decider
    Deciding,
    /// Waiting for the retry timer
    Scheduled,
}

type Completion<T, E> = oneshot::Sender<Result<T, RetryError<E>>>;

struct State<T, E> {
    phase: Phase,
    abort_reason: Option<AbortReason>,
    /// `None` once the run has settled
    completion: Option<Completion<T, E>>,
    subscription: Option<Subscription>,
}

/// Cancellation and completion state of a single run.
///
/// Shared between the engine task, the handle's `abort` and an external signal
/// listener. The first of abort / settle wins; everything after is a no-op.
pub(crate) struct RunController<A, T, E> {
    state: Mutex<State<T, E>>,
    log: ExecutionLog<A, T, E>,
    timer: CancellationToken,
}

impl<A, T, E> RunController<A, T, E> {
    pub fn new(log: ExecutionLog<A, T, E>) -> (Arc<Self>, oneshot::Receiver<Result<T, RetryError<E>>>) {
        let (tx, rx) = oneshot::channel();
        let ctl = Self {
            state: Mutex::new(State {
                phase: Phase::Idle,
                abort_reason: None,
                completion: Some(tx),
                subscription: None,
            }),
            log,
            timer: CancellationToken::new(),
        };
        (Arc::new(ctl), rx)
    }

    pub fn log(&self) -> &ExecutionLog<A, T, E> {
        &self.log
    }

    /// Keep the external signal subscription until the run settles
    pub fn attach(&self, subscription: Subscription) {
        let mut state = self.lock();
        if state.completion.is_some() {
            state.subscription = Some(subscription);
        }
        // otherwise dropped here, detaching right away
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().abort_reason.is_some()
    }

    /// Resolves once the pending retry timer must not fire
    pub async fn timer_cancelled(&self) {
        self.timer.cancelled().await
    }

    /// Abort the run. Only the first call on an unsettled run has any effect.
    pub fn abort(&self, reason: AbortReason) {
        let subscription = {
            let mut state = self.lock();
            if state.abort_reason.is_some() {
                return;
            }
            let Some(completion) = state.completion.take() else {
                debug!("Ignoring abort of a settled run");
                return;
            };
            info!("Run aborted: {}", reason);
            if matches!(state.phase, Phase::Deciding | Phase::Scheduled) {
                self.log.mark_aborted(&reason);
            }
            self.timer.cancel();
            state.abort_reason = Some(reason.clone());
            // the caller may have stopped listening already
            let _ = completion.send(Err(RetryError::Aborted(reason)));
            state.subscription.take()
        };
        drop(subscription);
    }

    /// Settle the run with its final result
    pub fn settle(&self, result: Result<T, RetryError<E>>) {
        let subscription = {
            let mut state = self.lock();
            let Some(completion) = state.completion.take() else {
                return;
            };
            state.phase = Phase::Idle;
            let _ = completion.send(result);
            state.subscription.take()
        };
        drop(subscription);
    }

    /// Give up on the run without a result, detaching the signal.
    ///
    /// The caller's receiver then sees the channel closed. No-op on a settled run.
    pub fn close(&self) {
        let (completion, subscription) = {
            let mut state = self.lock();
            state.phase = Phase::Idle;
            (state.completion.take(), state.subscription.take())
        };
        drop(completion);
        drop(subscription);
    }

    /// Move to `phase` unless the run was aborted
    pub fn enter(&self, phase: Phase) -> bool {
        let mut state = self.lock();
        if state.abort_reason.is_some() {
            return false;
        }
        state.phase = phase;
        true
    }

    /// Append the record of a finished attempt.
    ///
    /// Returns `false` if the run was aborted meanwhile, in which case the record
    /// is marked aborted and the decider must not be consulted.
    pub fn record(&self, record: ExecutionRecord<A, T, E>) -> bool {
        let mut state = self.lock();
        self.log.push(record);
        if let Some(reason) = &state.abort_reason {
            self.log.mark_aborted(reason);
            return false;
        }
        state.phase = Phase::Deciding;
        true
    }

    /// Attach the verdict to the latest record.
    ///
    /// The verdict is kept even when the run was aborted while it was being made;
    /// the record is then marked aborted and `false` is returned.
    pub fn decided(&self, decision: Decision<A, T, E>) -> bool {
        let mut state = self.lock();
        let retry = decision.is_try_again();
        self.log.set_decision(decision);
        if let Some(reason) = &state.abort_reason {
            self.log.mark_aborted(reason);
            return false;
        }
        if retry {
            state.phase = Phase::Scheduled;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, State<T, E>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
