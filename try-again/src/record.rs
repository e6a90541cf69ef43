use crate::decision::Decision;
use crate::signal::AbortReason;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;

/// One attempt of a run.
#[derive(Debug, Clone)]
pub struct ExecutionRecord<A, T, E> {
    /// Arguments the operation was called with
    pub args: A,
    pub start_time: Instant,
    /// Taken once the result is known, so deferred attempts include their await time
    pub finish_time: Instant,
    /// What the operation produced
    pub outcome: Result<T, E>,
    /// Verdict of the decider, `None` until it has been made
    pub decision: Option<Decision<A, T, E>>,
    pub aborted: bool,
    pub abort_reason: Option<AbortReason>,
}

impl<A, T, E> ExecutionRecord<A, T, E> {
    /// Record of a finished attempt, not yet judged or aborted
    pub fn new(args: A, start_time: Instant, finish_time: Instant, outcome: Result<T, E>) -> Self {
        Self {
            args,
            start_time,
            finish_time,
            outcome,
            decision: None,
            aborted: false,
            abort_reason: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.finish_time.saturating_duration_since(self.start_time)
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&E> {
        self.outcome.as_ref().err()
    }

    pub fn returned_value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }
}

/// Append-only history of the attempts of one run.
///
/// Clones share the same storage, so a log obtained before or during a run keeps
/// reflecting its progress. Readers only ever see complete records.
#[derive(Debug)]
pub struct ExecutionLog<A, T, E> {
    records: Arc<RwLock<Vec<ExecutionRecord<A, T, E>>>>,
}

impl<A, T, E> Clone for ExecutionLog<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
        }
    }
}

impl<A, T, E> Default for ExecutionLog<A, T, E> {
    fn default() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<A, T, E> ExecutionLog<A, T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Sum of the durations of all recorded attempts
    pub fn total_duration(&self) -> Duration {
        self.read().iter().map(|r| r.duration()).sum()
    }

    pub(crate) fn push(&self, record: ExecutionRecord<A, T, E>) {
        self.write().push(record);
    }

    pub(crate) fn set_decision(&self, decision: Decision<A, T, E>) {
        if let Some(last) = self.write().last_mut() {
            last.decision = Some(decision);
        }
    }

    /// Mark the latest record aborted, unless it already is
    pub(crate) fn mark_aborted(&self, reason: &AbortReason) {
        if let Some(last) = self.write().last_mut() {
            if !last.aborted {
                last.aborted = true;
                last.abort_reason = Some(reason.clone());
            }
        }
    }

    pub(crate) fn same_log(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ExecutionRecord<A, T, E>>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ExecutionRecord<A, T, E>>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl<A: Clone, T: Clone, E: Clone> ExecutionLog<A, T, E> {
    /// Copy of the record at `index`
    pub fn get(&self, index: usize) -> Option<ExecutionRecord<A, T, E>> {
        self.read().get(index).cloned()
    }

    pub fn last(&self) -> Option<ExecutionRecord<A, T, E>> {
        self.read().last().cloned()
    }

    /// Copy of all records in attempt order
    pub fn snapshot(&self) -> Vec<ExecutionRecord<A, T, E>> {
        self.read().clone()
    }

    /// Run `f` against a copy of the records.
    ///
    /// No lock is held while `f` runs, so it may abort the run or read the log again.
    pub fn with_records<R>(&self, f: impl FnOnce(&[ExecutionRecord<A, T, E>]) -> R) -> R {
        f(&self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ms: u64, outcome: Result<u32, String>) -> ExecutionRecord<(), u32, String> {
        let start = Instant::now();
        ExecutionRecord::new((), start, start + Duration::from_millis(ms), outcome)
    }

    #[test]
    fn clones_share_storage() {
        let log = ExecutionLog::new();
        let view = log.clone();
        assert!(view.is_empty());

        log.push(record(10, Err("e1".into())));
        log.push(record(20, Ok(5)));

        assert_eq!(view.len(), 2);
        assert!(view.same_log(&log));
        assert_eq!(view.total_duration(), Duration::from_millis(30));
        assert_eq!(view.get(0).unwrap().error().map(String::as_str), Some("e1"));
        assert_eq!(view.last().unwrap().returned_value(), Some(&5));
    }

    #[test]
    fn decision_and_abort_target_last_record() {
        let log = ExecutionLog::new();
        log.push(record(1, Err("e1".into())));
        log.push(record(1, Err("e2".into())));

        log.set_decision(Decision::Stop("e2".into()));
        log.mark_aborted(&AbortReason::from("first"));
        log.mark_aborted(&AbortReason::from("second"));

        let snapshot = log.snapshot();
        assert!(snapshot[0].decision.is_none());
        assert!(!snapshot[0].aborted);
        assert!(snapshot[1].decision.as_ref().is_some_and(|d| d.is_stop()));
        assert!(snapshot[1].aborted);
        assert_eq!(snapshot[1].abort_reason, Some(AbortReason::from("first")));
    }

    #[test]
    fn empty_log_marks_nothing() {
        let log: ExecutionLog<(), u32, String> = ExecutionLog::new();
        log.set_decision(Decision::Return(1));
        log.mark_aborted(&AbortReason::Unspecified);
        assert!(log.is_empty());
        assert!(log.last().is_none());
    }

    #[test]
    fn with_records_holds_no_lock() {
        let log = ExecutionLog::new();
        log.push(record(1, Err("e1".into())));

        let len = log.with_records(|records| {
            log.mark_aborted(&AbortReason::from("inside"));
            log.push(record(1, Ok(2)));
            records.len()
        });

        assert_eq!(len, 1);
        assert_eq!(log.len(), 2);
        assert!(log.get(0).unwrap().aborted);
    }
}
