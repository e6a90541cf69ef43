//! Cancellation signals.
//!
//! The engine only depends on the [`AbortSignal`] trait: a signal reports whether it
//! has already fired and lets a run subscribe a one-shot listener. [`AbortController`]
//! is the in-process implementation.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Why a run was aborted.
#[derive(Clone)]
pub enum AbortReason {
    /// No reason was given
    Unspecified,
    /// A plain message, surfaced as `Aborted: <message>`
    Message(String),
    /// An arbitrary error value, surfaced unchanged
    Error(Arc<dyn Error + Send + Sync>),
}

impl AbortReason {
    pub fn error<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        AbortReason::Error(Arc::new(err))
    }
}

impl fmt::Debug for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Unspecified => write!(f, "Unspecified"),
            AbortReason::Message(m) => f.debug_tuple("Message").field(m).finish(),
            AbortReason::Error(e) => f.debug_tuple("Error").field(&e.to_string()).finish(),
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Unspecified => write!(f, "Aborted"),
            AbortReason::Message(m) => write!(f, "Aborted: {}", m),
            AbortReason::Error(e) => write!(f, "{}", e),
        }
    }
}

impl PartialEq for AbortReason {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AbortReason::Unspecified, AbortReason::Unspecified) => true,
            (AbortReason::Message(a), AbortReason::Message(b)) => a == b,
            (AbortReason::Error(a), AbortReason::Error(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for AbortReason {
    fn from(value: &str) -> Self {
        AbortReason::Message(value.to_owned())
    }
}

impl From<String> for AbortReason {
    fn from(value: String) -> Self {
        AbortReason::Message(value)
    }
}

impl From<Option<&str>> for AbortReason {
    fn from(value: Option<&str>) -> Self {
        value.map(AbortReason::from).unwrap_or(AbortReason::Unspecified)
    }
}

/// Listener registered on an [`AbortSignal`], called at most once.
pub type AbortListener = Box<dyn FnOnce(AbortReason) + Send>;

/// A source of cancellation that runs can subscribe to.
pub trait AbortSignal: fmt::Debug + Send + Sync {
    /// The abort reason if the signal has already fired
    fn reason(&self) -> Option<AbortReason>;

    /// Register `listener` to be called once when the signal fires.
    ///
    /// Dropping (or [`Subscription::unsubscribe`]-ing) the returned subscription
    /// guarantees the listener is not called afterwards.
    fn subscribe(&self, listener: AbortListener) -> Subscription;

    fn is_aborted(&self) -> bool {
        self.reason().is_some()
    }
}

/// Detaches a listener from its signal when dropped.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription with nothing to detach
    pub fn noop() -> Self {
        Self { detach: None }
    }

    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

#[derive(Default)]
struct SignalState {
    reason: Option<AbortReason>,
    next_id: u64,
    listeners: HashMap<u64, AbortListener>,
}

/// In-process [`AbortSignal`] that fires when [`AbortController::abort`] is called.
///
/// Clones share the same state.
#[derive(Clone, Default)]
pub struct AbortController {
    state: Arc<Mutex<SignalState>>,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    /// A controller that has already fired with `reason`
    pub fn aborted(reason: impl Into<AbortReason>) -> Self {
        let ctl = Self::new();
        ctl.abort(reason);
        ctl
    }

    /// Fire the signal. Only the first call has any effect.
    pub fn abort(&self, reason: impl Into<AbortReason>) {
        let reason = reason.into();
        let listeners = {
            let mut state = self.lock();
            if state.reason.is_some() {
                return;
            }
            state.reason = Some(reason.clone());
            std::mem::take(&mut state.listeners)
        };
        // listeners may unsubscribe themselves, so they run without the lock held
        for (_, listener) in listeners {
            listener(reason.clone());
        }
    }

    /// Number of listeners currently attached
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for AbortController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("AbortController")
            .field("reason", &state.reason)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl AbortSignal for AbortController {
    fn reason(&self) -> Option<AbortReason> {
        self.lock().reason.clone()
    }

    fn subscribe(&self, listener: AbortListener) -> Subscription {
        let id = {
            let mut state = self.lock();
            if state.reason.is_none() {
                let id = state.next_id;
                state.next_id += 1;
                state.listeners.insert(id, listener);
                id
            } else {
                return Subscription::noop();
            }
        };
        let state = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                state.listeners.remove(&id);
            }
        })
    }
}
