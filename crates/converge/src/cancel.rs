//! Cooperative cancellation for reconciliation passes
//!
//! Cancellation never interrupts a cluster call that is already running.
//! It is observed between actions and during backoff sleeps.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Shared cancellation flag; clones observe the same flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake any sleeper
    pub fn cancel(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration` unless cancelled first
    ///
    /// Returns `true` if the full duration elapsed without cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = condvar
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        !*guard
    }
}

/// Time budget of one pass, combined with an external cancel token
#[derive(Debug, Clone)]
pub struct PassDeadline {
    token: CancelToken,
    deadline: Option<Instant>,
}

impl PassDeadline {
    /// Deadline `timeout` from now; `None` means no time limit
    pub fn new(timeout: Option<Duration>, token: CancelToken) -> Self {
        Self {
            token,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// No time limit and a fresh token
    pub fn unbounded() -> Self {
        Self::new(None, CancelToken::new())
    }

    /// Check whether no further work may start
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Check whether the time budget, as opposed to the token, ran out
    pub fn timed_out(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Sleep up to `duration`, cut short by the deadline or cancellation
    ///
    /// Returns `true` if work may continue afterwards.
    pub fn sleep(&self, duration: Duration) -> bool {
        let duration = self
            .remaining()
            .map_or(duration, |remaining| duration.min(remaining));
        self.token.sleep(duration) && !self.is_expired()
    }
}
