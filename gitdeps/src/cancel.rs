//! Cooperative cancellation shared by fetch and extract work.
//!
//! A [`CancellationToken`] is cheap to clone; every clone observes the same
//! flag. An optional deadline turns the token into a timeout: once the
//! deadline passes the token reports itself cancelled without anyone calling
//! [`CancellationToken::cancel`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why a cancelled operation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Cancelled {
    /// [`CancellationToken::cancel`] was called.
    #[error("operation cancelled")]
    Requested,

    /// The token's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

/// Shared cancellation flag with an optional deadline.
///
/// # Examples
///
/// ```
/// use ue_gitdeps::cancel::{CancellationToken, Cancelled};
///
/// let token = CancellationToken::new();
/// let worker_view = token.clone();
/// assert!(worker_view.check().is_ok());
///
/// token.cancel();
/// assert_eq!(worker_view.check(), Err(Cancelled::Requested));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a token that only fires when cancelled explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that fires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: Some(deadline),
            }),
        }
    }

    /// Create a token that fires once `timeout` has elapsed from now.
    ///
    /// A timeout too large to represent yields a token without a deadline.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Instant::now()
            .checked_add(timeout)
            .map_or_else(Self::new, Self::with_deadline)
    }

    /// Request cancellation; every clone observes it.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// Return whether the token was cancelled or its deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Return `Ok(())` while work may continue.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled::Requested`] after [`Self::cancel`] and
    /// [`Cancelled::DeadlineExceeded`] once the deadline has passed.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return Err(Cancelled::Requested);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Cancelled::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Time left before the deadline, if the token has one.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.remaining().is_none());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert_eq!(token.check(), Err(Cancelled::Requested));
    }

    #[test]
    fn past_deadline_reports_exceeded() {
        let token = CancellationToken::with_deadline(Instant::now());
        assert_eq!(token.check(), Err(Cancelled::DeadlineExceeded));
        assert_eq!(token.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn explicit_cancel_takes_precedence_over_deadline() {
        let token = CancellationToken::with_deadline(Instant::now());
        token.cancel();
        assert_eq!(token.check(), Err(Cancelled::Requested));
    }

    #[test]
    fn distant_timeout_leaves_time_remaining() {
        let token = CancellationToken::with_timeout(Duration::from_secs(3600));
        assert!(token.check().is_ok());
        assert!(token.remaining().is_some_and(|left| left > Duration::from_secs(3500)));
    }
}
