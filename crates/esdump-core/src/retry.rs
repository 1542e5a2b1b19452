//! Retry with exponential backoff and jitter for page requests

use std::time::Duration;

use indicatif::ProgressBar;
use rand::Rng;

use crate::error::ExportError;
use crate::shutdown::CancelToken;

/// Sleep granularity while backing off, so cancellation is noticed promptly
const SLEEP_STEP: Duration = Duration::from_millis(100);

/// Retry budget and backoff shape for a single request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for the exponential delay (before jitter)
    pub max_delay: Duration,
    /// Fraction of the delay randomized either way, in `[0, 1]`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately (tests, fake transports)
    pub const fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Exponential backoff before jitter: base * 2^(attempt-1), capped at `max_delay`.
    ///
    /// `attempt` is 1-based (the first retry).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff with symmetric jitter applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if base.is_zero() || jitter == 0.0 {
            return base;
        }
        let scale = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(scale)
    }

    /// Run `attempt_fn` until it succeeds, fails non-transiently, or the budget runs out.
    ///
    /// Cancellation is checked before every attempt and during backoff; once
    /// observed, no further attempt is made and `ExportError::Cancelled` is returned.
    pub fn run<T>(
        &self,
        label: &str,
        cancel: &CancelToken,
        pb: &ProgressBar,
        mut attempt_fn: impl FnMut() -> Result<T, ExportError>,
    ) -> Result<T, ExportError> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(ExportError::Cancelled);
            }
            match attempt_fn() {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_retries && e.is_retryable() => {
                    attempt += 1;
                    let delay = self.delay(attempt);
                    pb.set_message(format!("retry {attempt}/{}...", self.max_retries));
                    log::debug!(
                        "{label}: attempt {attempt}/{} failed: {e}, retrying in {delay:?}",
                        self.max_retries
                    );
                    sleep_unless_cancelled(delay, cancel);
                }
                Err(e) => {
                    if e.is_retryable() {
                        log::error!("{label}: retry budget exhausted: {e}");
                    } else if !e.is_cancelled() {
                        log::error!("{label}: failed permanently: {e}");
                    }
                    return Err(e);
                }
            }
        }
    }
}

fn sleep_unless_cancelled(total: Duration, cancel: &CancelToken) {
    let mut remaining = total;
    while !remaining.is_zero() && !cancel.is_cancelled() {
        let step = remaining.min(SLEEP_STEP);
        std::thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        }
    }

    #[test]
    fn backoff_exponential() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_capped() {
        assert_eq!(policy().backoff(4), Duration::from_secs(10));
        assert_eq!(policy().backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let p = RetryPolicy {
            jitter: 0.5,
            ..policy()
        };
        for _ in 0..100 {
            let d = p.delay(1);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(3), "{d:?}");
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = RetryPolicy::immediate(3).run(
            "t",
            &CancelToken::new(),
            &ProgressBar::hidden(),
            || {
                calls += 1;
                if calls < 3 {
                    Err(ExportError::Connection("reset".into()))
                } else {
                    Ok(calls)
                }
            },
        );
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn exhausts_budget() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::immediate(2).run(
            "t",
            &CancelToken::new(),
            &ProgressBar::hidden(),
            || {
                calls += 1;
                Err(ExportError::Http {
                    status: 503,
                    message: "unavailable".into(),
                })
            },
        );
        assert!(matches!(result, Err(ExportError::Http { status: 503, .. })));
        assert_eq!(calls, 3);
    }

    #[test]
    fn non_transient_fails_immediately() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::immediate(5).run(
            "t",
            &CancelToken::new(),
            &ProgressBar::hidden(),
            || {
                calls += 1;
                Err(ExportError::Authentication("bad password".into()))
            },
        );
        assert!(matches!(result, Err(ExportError::Authentication(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn no_retry_after_cancel() {
        let cancel = CancelToken::new();
        let mut calls = 0;
        let result: Result<(), _> =
            RetryPolicy::immediate(5).run("t", &cancel, &ProgressBar::hidden(), || {
                calls += 1;
                cancel.cancel();
                Err(ExportError::Connection("timeout".into()))
            });
        assert!(matches!(result, Err(ExportError::Cancelled)));
        assert_eq!(calls, 1);
    }
}
