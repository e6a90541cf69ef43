use crate::signal::AbortSignal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ─── Options ───────────────────────────────────────────────────────────────────

/// Options used to build the [`DefaultDecider`](crate::DefaultDecider).
///
/// All durations are in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Options {
    /// Maximum number of retries (not counting the first attempt)
    pub retries: u32,
    /// Hard ceiling for a single delay
    pub max_delay: u64,
    /// Base delay, doubled for every failed attempt
    pub delay_multiplier: u64,
    /// Upper bound of the random jitter added to each delay
    pub max_delay_variation: u64,
    /// Time budget measured over all attempts of a run.
    ///
    /// The last delay is shortened so the final attempt is started within the budget.
    pub total_timeout: u64,
    /// External cancellation signal
    #[serde(skip)]
    pub signal: Option<Arc<dyn AbortSignal>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            retries: 2,
            max_delay: 10_000,
            delay_multiplier: 1_000,
            max_delay_variation: 0,
            total_timeout: 30_000,
            signal: None,
        }
    }
}

impl Options {
    /// Set the maximum number of retries
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Cap a single delay at `ms`
    pub fn with_max_delay(mut self, ms: u64) -> Self {
        self.max_delay = ms;
        self
    }

    /// Set the base delay of the first retry
    pub fn with_delay_multiplier(mut self, ms: u64) -> Self {
        self.delay_multiplier = ms;
        self
    }

    /// Add up to `ms` of random jitter to each delay
    pub fn with_max_delay_variation(mut self, ms: u64) -> Self {
        self.max_delay_variation = ms;
        self
    }

    /// Set the time budget for all attempts of a run
    pub fn with_total_timeout(mut self, ms: u64) -> Self {
        self.total_timeout = ms;
        self
    }

    /// Abort runs when `signal` fires
    pub fn with_signal(mut self, signal: Arc<dyn AbortSignal>) -> Self {
        self.signal = Some(signal);
        self
    }
}

// ─── Backoff ───────────────────────────────────────────────────────────────────

/// Calculate the delay in milliseconds before the next attempt.
///
/// `total_exec_ms` is the time spent inside the operation over all attempts so far
/// and `exec_count` the (1-based) number of attempts made. Returns `None` when no
/// further attempt is allowed, either because the retry count is exhausted or
/// because the remaining budget cannot fit another average-length attempt.
pub fn next_delay(total_exec_ms: u64, exec_count: u32, options: &Options) -> Option<u64> {
    let total = total_exec_ms as f64;
    let count = exec_count.max(1) as f64;
    let max_allowable = (options.total_timeout as f64 - total - total / count).floor();
    if max_allowable <= 0.0 || exec_count > options.retries {
        return None;
    }
    let jitter = (rand::random::<f64>() * options.max_delay_variation as f64).floor();
    let backoff = 2f64.powi(exec_count as i32 - 1) * options.delay_multiplier as f64 + jitter;
    Some(backoff.min(options.max_delay as f64).min(max_allowable) as u64)
}
