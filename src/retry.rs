use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{AppError, ErrorKind};

/// HTTP statuses worth another attempt: rate limiting and server-side failures.
const RETRYABLE_STATUSES: [u16; 4] = [429, 500, 502, 503];

/// Bounded retry with linear backoff (`attempt × base_delay`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps between attempts.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Whether `err` is transient and the call may be repeated.
    ///
    /// Network failures and 429/500/502/503 responses are retryable.
    /// Authentication, permission, not-found and local validation errors
    /// are not.
    pub fn is_retryable(err: &AppError) -> bool {
        match err.kind() {
            ErrorKind::Network => true,
            ErrorKind::Api => err
                .status()
                .is_some_and(|status| RETRYABLE_STATUSES.contains(&status)),
            ErrorKind::Authentication
            | ErrorKind::Permission
            | ErrorKind::Validation
            | ErrorKind::Repository
            | ErrorKind::Issue
            | ErrorKind::Internal => false,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is reached.
    ///
    /// When attempts run out the last error is wrapped with an
    /// "attempts exhausted" message; its kind and status are preserved.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !Self::is_retryable(&err) => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    warn!(operation, attempts = attempt, error = %err, "retry attempts exhausted");
                    return Err(err
                        .wrap(format!(
                            "{} failed after {} attempts",
                            operation, attempt
                        ))
                        .with_context("attempts", attempt.to_string()));
                }
                Err(err) => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
