//! Reconnect backoff for the worker loop.
//!
//! Consecutive connection failures back off exponentially from
//! `reconnect_ivl`, doubling up to `reconnect_ivl_max`. A zero maximum pins
//! the delay at the base interval. A successful session starts over.

use std::time::Duration;

use crate::options::WorkerOptions;

/// Largest shift applied to the base interval.
const MAX_DOUBLINGS: u32 = 16;

/// Failure counter plus the delay schedule derived from [`WorkerOptions`].
///
/// ```rust
/// use netbridge_core::options::WorkerOptions;
/// use netbridge_core::reconnect::ReconnectState;
/// use std::time::Duration;
///
/// let options = WorkerOptions::default()
///     .with_reconnect_ivl(Duration::from_millis(50))
///     .with_reconnect_ivl_max(Duration::from_millis(150))
///     .with_max_reconnect_attempts(Some(3));
///
/// let mut backoff = ReconnectState::new(&options);
/// assert_eq!(backoff.fail(), Ok(Duration::from_millis(50)));
/// assert_eq!(backoff.fail(), Ok(Duration::from_millis(100)));
/// assert_eq!(backoff.fail(), Ok(Duration::from_millis(150)));
/// assert!(backoff.fail().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectState {
    base: Duration,
    ceiling: Option<Duration>,
    limit: Option<u32>,
    failures: u32,
}

impl ReconnectState {
    pub fn new(options: &WorkerOptions) -> Self {
        Self {
            base: options.reconnect_ivl,
            ceiling: (!options.reconnect_ivl_max.is_zero()).then_some(options.reconnect_ivl_max),
            limit: options.max_reconnect_attempts,
            failures: 0,
        }
    }

    /// The delay the next failure will wait, without recording one.
    #[must_use]
    pub fn current_interval(&self) -> Duration {
        let Some(ceiling) = self.ceiling else {
            return self.base;
        };
        let factor = 1_u32 << self.failures.min(MAX_DOUBLINGS);
        self.base.saturating_mul(factor).min(ceiling)
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_interval();
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Like [`next_delay`](Self::next_delay), but refuses once
    /// `max_reconnect_attempts` failures have been recorded.
    pub fn fail(&mut self) -> Result<Duration, ReconnectError> {
        match self.limit {
            Some(limit) if self.failures >= limit => Err(ReconnectError::MaxAttemptsReached {
                attempts: self.failures,
            }),
            _ => Ok(self.next_delay()),
        }
    }

    /// Forget past failures after a session that connected.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures recorded so far.
    #[inline]
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.failures
    }
}

/// The worker stopped retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconnectError {
    #[error("gave up after {attempts} consecutive connection attempts")]
    MaxAttemptsReached { attempts: u32 },
}
