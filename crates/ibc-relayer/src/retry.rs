// Fixed-delay retry for tx building steps and whole submissions
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cancel::Cancellation;
use crate::error::RelayerError;

/// Number of attempts made for every retried step
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Pause between two attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
    /// Surface only the final error instead of the whole history
    pub last_error_only: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            last_error_only: true,
        }
    }
}

/// What a retry loop wraps, which decides how a sequence mismatch is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// One step of building a tx; a mismatch is returned as is
    Step,
    /// A whole submission, which resynchronises the sequence on a mismatch
    Submission,
}

impl RetryPolicy {
    /// Run `operation` until it succeeds, fails with a non-retryable error or
    /// a sequence mismatch, exhausts its attempts, or `cancel` fires.
    pub async fn retry<T, F, Fut>(
        &self,
        operation_name: &str,
        cancel: &Cancellation,
        operation: F,
    ) -> Result<T, RelayerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RelayerError>>,
    {
        self.run(operation_name, cancel, operation, |_, _| {}, Scope::Step)
            .await
    }

    /// Retry a whole build-and-broadcast submission, invoking
    /// `on_retry(attempt, error)` before each new attempt.
    ///
    /// Unlike [`RetryPolicy::retry`], sequence mismatches are retried.
    pub async fn retry_submission<T, F, Fut, N>(
        &self,
        operation_name: &str,
        cancel: &Cancellation,
        operation: F,
        on_retry: N,
    ) -> Result<T, RelayerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RelayerError>>,
        N: FnMut(u32, &RelayerError),
    {
        self.run(operation_name, cancel, operation, on_retry, Scope::Submission)
            .await
    }

    async fn run<T, F, Fut, N>(
        &self,
        operation_name: &str,
        cancel: &Cancellation,
        mut operation: F,
        mut on_retry: N,
        scope: Scope,
    ) -> Result<T, RelayerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RelayerError>>,
        N: FnMut(u32, &RelayerError),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut history = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(operation = operation_name, attempt, max_attempts, "executing");

            let error = match cancel.guard(operation()).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                debug!(operation = operation_name, attempt, error = %error, "not retryable");
                return Err(error);
            }

            if scope == Scope::Step && error.is_sequence_mismatch() {
                debug!(
                    operation = operation_name,
                    attempt,
                    error = %error,
                    "sequence mismatch, leaving it to the submission"
                );
                return Err(error);
            }

            if attempt >= max_attempts {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %error,
                    "giving up after final attempt"
                );
                if self.last_error_only {
                    return Err(error);
                }
                history.push(error.to_string());
                return Err(RelayerError::RetriesExhausted {
                    attempts: attempt,
                    errors: history,
                });
            }

            warn!(
                operation = operation_name,
                attempt,
                max_attempts,
                error = %error,
                "attempt failed, retrying"
            );
            on_retry(attempt, &error);
            if !self.last_error_only {
                history.push(error.to_string());
            }

            cancel
                .guard(async {
                    sleep(self.delay).await;
                    Ok(())
                })
                .await?;
        }
    }
}
