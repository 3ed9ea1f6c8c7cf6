//! Transient-error retries with Fibonacci backoff.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{GraphSession, StoreError, Summary};
use crate::query::{Parameters, Statement};

/// Retry policy for transient store errors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `fib(n) * base_delay_ms`.
    pub base_delay_ms: u64,
    /// Cap on any single delay.
    pub max_delay_ms: u64,
    /// No new attempt starts once this much time has passed since the first.
    pub max_elapsed_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            max_elapsed_ms: 120_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based): 1, 1, 2, 3, 5, ... units.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let (mut prev, mut current) = (0u64, 1u64);
        for _ in 1..retry {
            let next = prev.saturating_add(current);
            prev = current;
            current = next;
        }
        Duration::from_millis(current.saturating_mul(self.base_delay_ms).min(self.max_delay_ms))
    }
}

/// Session decorator that re-runs statements failing with a transient error.
///
/// Statements are idempotent, so a retry after a failure that may or may not
/// have committed is safe.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: GraphSession> Retrying<S> {
    /// Wraps `inner`.
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Wrapped session.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwraps the session.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Active policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<S: GraphSession> GraphSession for Retrying<S> {
    fn run(&self, statement: &Statement, params: &Parameters) -> Result<Summary, StoreError> {
        let started = Instant::now();
        let budget = Duration::from_millis(self.policy.max_elapsed_ms);
        let mut attempt: u32 = 1;
        loop {
            let error = match self.inner.run(statement, params) {
                Ok(summary) => {
                    if attempt > 1 {
                        debug!(attempt, "store.retry.recovered");
                    }
                    return Ok(summary);
                }
                Err(error) => error,
            };
            if !error.is_transient() {
                return Err(error);
            }
            let delay = self.policy.delay_for(attempt);
            if attempt >= self.policy.max_attempts || started.elapsed() + delay > budget {
                warn!(attempts = attempt, error = %error, "store.retry.exhausted");
                return Err(error);
            }
            debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "store.retry"
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }
}
