//! Linear backoff retry policy and per-message retry state.
//!
//! The wait after the n-th failed attempt is `min(n * interval, max_wait)`.
//! Every `failures_before_reauth` consecutive failures the connection is
//! dropped and re-established with fresh credentials.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry limits for one handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempt limit; zero or negative retries forever.
    pub retries: i64,
    /// Backoff step added per failed attempt.
    pub interval: Duration,
    /// Upper bound for a single wait.
    pub max_wait: Duration,
    /// Consecutive failures that trigger reauthentication.
    pub failures_before_reauth: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: -1,
            interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
            failures_before_reauth: 5,
        }
    }
}

impl RetryPolicy {
    /// Whether attempts are bounded.
    pub fn is_bounded(&self) -> bool {
        self.retries > 0
    }

    /// Wait after `tries` failed attempts.
    pub fn backoff(&self, tries: u32) -> Duration {
        self.interval.saturating_mul(tries).min(self.max_wait)
    }
}

/// What the engine does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureTransition {
    /// The attempt limit is reached; record the failure and stop.
    Exhausted,
    /// Sleep, then try again.
    Wait {
        /// How long to sleep
        delay: Duration,
        /// Drop the connection and force a fresh one before the next attempt
        reauth: bool,
    },
}

/// Counters for one message's delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Failed attempts overall.
    pub tries: u32,
    /// Failed attempts since the last reauthentication.
    pub failures: u32,
}

impl RetryState {
    /// Fresh state for a new message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed attempt and decides what happens next.
    pub fn on_failure(&mut self, policy: &RetryPolicy) -> FailureTransition {
        self.tries = self.tries.saturating_add(1);
        self.failures = self.failures.saturating_add(1);

        if policy.is_bounded() && i64::from(self.tries) >= policy.retries {
            return FailureTransition::Exhausted;
        }

        let delay = policy.backoff(self.tries);
        let reauth = self.failures >= policy.failures_before_reauth;
        if reauth {
            self.failures = 0;
        }

        FailureTransition::Wait { delay, reauth }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(retries: i64) -> RetryPolicy {
        RetryPolicy {
            retries,
            interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(100),
            failures_before_reauth: 2,
        }
    }

    #[test]
    fn backoff_is_linear_and_capped() {
        let policy = policy(-1);
        let delays: Vec<u64> = (1..=5).map(|tries| policy.backoff(tries).as_secs()).collect();
        assert_eq!(delays, vec![30, 60, 90, 100, 100]);
    }

    #[test]
    fn single_retry_exhausts_on_first_failure() {
        let mut state = RetryState::new();
        assert_eq!(state.on_failure(&policy(1)), FailureTransition::Exhausted);
        assert_eq!(state.tries, 1);
    }

    #[test]
    fn exhausts_when_tries_reach_limit() {
        let policy = policy(3);
        let mut state = RetryState::new();

        assert!(matches!(state.on_failure(&policy), FailureTransition::Wait { .. }));
        assert!(matches!(state.on_failure(&policy), FailureTransition::Wait { .. }));
        assert_eq!(state.on_failure(&policy), FailureTransition::Exhausted);
    }

    #[test]
    fn unbounded_policies_never_exhaust() {
        for retries in [0, -1, -50] {
            let policy = policy(retries);
            let mut state = RetryState::new();
            for _ in 0..100 {
                assert!(matches!(state.on_failure(&policy), FailureTransition::Wait { .. }));
            }
        }
    }

    #[test]
    fn reauth_every_threshold_failures() {
        let policy = policy(-1);
        let mut state = RetryState::new();

        let reauths: Vec<bool> = (0..6)
            .map(|_| match state.on_failure(&policy) {
                FailureTransition::Wait { reauth, .. } => reauth,
                FailureTransition::Exhausted => unreachable!("unbounded policy"),
            })
            .collect();

        assert_eq!(reauths, vec![false, true, false, true, false, true]);
        assert_eq!(state.failures, 0);
        assert_eq!(state.tries, 6);
    }
}
