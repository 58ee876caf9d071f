//! Bounded retry strategies.
//
// Every retry in the acquisition engine goes through `retry_bounded`, so there
// is exactly one place that decides how often a malformed acknowledgment or a
// corrupted frame may be retried before the session is declared faulted.

use crate::error::{AppResult, DaqError};
use log::warn;
use std::time::Duration;

/// Defines a policy for retrying an operation.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// The maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// The delay between attempts.
    pub backoff_delay: Duration,
}

impl Default for RetryPolicy {
    /// One attempt plus exactly one retry.
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_delay: Duration::ZERO,
        }
    }
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, R> {
    /// The attempt succeeded.
    Done(T),
    /// The attempt failed in a retryable way.
    Retry(R),
}

/// Runs `attempt` until it returns [`Attempt::Done`] or the policy is exhausted.
///
/// Errors returned by `attempt` are fatal and propagate immediately. When every
/// attempt asked for a retry, the last reason is escalated through `exhausted`.
pub fn retry_bounded<T, R, F, E>(
    context: &str,
    policy: &RetryPolicy,
    mut attempt: F,
    exhausted: E,
) -> AppResult<T>
where
    R: std::fmt::Display,
    F: FnMut(u32) -> AppResult<Attempt<T, R>>,
    E: FnOnce(R) -> DaqError,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt_no = 0;
    loop {
        match attempt(attempt_no)? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Retry(reason) => {
                attempt_no += 1;
                if attempt_no >= max_attempts {
                    warn!(
                        "[{}] giving up after {} attempts: {}",
                        context, max_attempts, reason
                    );
                    return Err(exhausted(reason));
                }
                warn!(
                    "[{}] attempt {} of {} failed ({}), retrying",
                    context, attempt_no, max_attempts, reason
                );
                if !policy.backoff_delay.is_zero() {
                    std::thread::sleep(policy.backoff_delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_logic_succeeds() {
        let mut calls = 0;
        let result = retry_bounded(
            "test",
            &RetryPolicy::default(),
            |n| {
                calls += 1;
                Ok(if n == 0 {
                    Attempt::Retry("short frame")
                } else {
                    Attempt::Done(42)
                })
            },
            |reason| DaqError::Handshake(reason.to_string()),
        );
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_retry_logic_fails_after_bound() {
        let mut calls = 0;
        let result: AppResult<()> = retry_bounded(
            "test",
            &RetryPolicy::default(),
            |_| {
                calls += 1;
                Ok(Attempt::Retry("bad ack"))
            },
            |reason| DaqError::Handshake(reason.to_string()),
        );
        assert!(matches!(result, Err(DaqError::Handshake(ref r)) if r == "bad ack"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_fatal_error_is_not_retried() {
        let mut calls = 0;
        let result: AppResult<()> = retry_bounded(
            "test",
            &RetryPolicy {
                max_attempts: 5,
                backoff_delay: Duration::ZERO,
            },
            |_| -> AppResult<Attempt<(), &str>> {
                calls += 1;
                Err(DaqError::ConnectionLost("unplugged".into()))
            },
            |reason| DaqError::Handshake(reason.to_string()),
        );
        assert!(matches!(result, Err(DaqError::ConnectionLost(_))));
        assert_eq!(calls, 1);
    }
}
