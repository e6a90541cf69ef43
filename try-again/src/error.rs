use crate::signal::AbortReason;
use std::error::Error;
use std::fmt;

/// Why a run did not resolve with a value.
#[derive(Debug, Clone)]
pub enum RetryError<E> {
    /// The decider returned [`Decision::Stop`](crate::Decision::Stop)
    Stopped(E),
    /// The decider failed, or an awaitable could not be subscribed to.
    ///
    /// These failures are never retried.
    Protocol(E),
    /// The run was aborted through the handle or an external signal
    Aborted(AbortReason),
    /// The task driving the run ended without settling it, e.g. on runtime shutdown
    Lost,
}

impl<E> RetryError<E> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, RetryError::Aborted(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, RetryError::Protocol(_))
    }

    /// The inner error, if the run was not aborted
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Stopped(e) | RetryError::Protocol(e) => Some(e),
            RetryError::Aborted(_) | RetryError::Lost => None,
        }
    }

    /// Reference to the inner error, if the run was not aborted
    pub fn inner(&self) -> Option<&E> {
        match self {
            RetryError::Stopped(e) | RetryError::Protocol(e) => Some(e),
            RetryError::Aborted(_) | RetryError::Lost => None,
        }
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            RetryError::Aborted(r) => Some(r),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Stopped(e) => write!(f, "{}", e),
            RetryError::Protocol(e) => write!(f, "retry protocol failure: {}", e),
            RetryError::Aborted(r) => write!(f, "{}", r),
            RetryError::Lost => write!(f, "run ended without a result"),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Aborted(AbortReason::Error(e)) => Some(e.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_normalizes_abort() {
        let err: RetryError<String> = RetryError::Aborted(AbortReason::from("X"));
        assert_eq!(err.to_string(), "Aborted: X");
        let err: RetryError<String> = RetryError::Aborted(AbortReason::Unspecified);
        assert_eq!(err.to_string(), "Aborted");
        assert!(err.is_aborted());
        assert_eq!(err.into_inner(), None);
    }

    #[test]
    fn stopped_shows_inner_error() {
        let err = RetryError::Stopped("boom".to_string());
        assert_eq!(err.to_string(), "boom");
        assert!(!err.is_protocol());
        assert_eq!(err.into_inner().as_deref(), Some("boom"));
    }

    #[test]
    fn aborted_with_error_has_source() {
        let reason = AbortReason::error(std::io::Error::other("shutdown"));
        let err: RetryError<String> = RetryError::Aborted(reason);
        assert_eq!(err.to_string(), "shutdown");
        assert!(err.source().is_some());
    }

    #[test]
    fn lost_run_is_not_an_abort() {
        let err: RetryError<String> = RetryError::Lost;
        assert_eq!(err.to_string(), "run ended without a result");
        assert!(!err.is_aborted());
        assert!(err.abort_reason().is_none());
        assert_eq!(err.into_inner(), None);
    }
}
