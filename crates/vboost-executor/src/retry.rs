//! Bounded retries around one round.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vboost_core::{ExecutionResult, RoundOutcome};

/// Retries transient failures with doubling backoff.
///
/// Permanent failures and successes (including recovered warnings) return
/// immediately. Backoff sleeps end early when `shutdown` is cancelled.
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    max_retries: u32,
    base_backoff: Duration,
    shutdown: CancellationToken,
}

impl RetryCoordinator {
    /// `max_retries` is the total number of attempts, at least one.
    pub fn new(max_retries: u32, shutdown: CancellationToken) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_backoff: Duration::from_secs(1),
            shutdown,
        }
    }

    #[must_use]
    pub fn with_base_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before the attempt following `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(1u32 << attempt.min(16))
    }

    /// Run `round` until it succeeds, fails permanently, or attempts run
    /// out. `round` receives the 0-based attempt number.
    pub async fn execute_with_retry<F, Fut>(&self, mut round: F) -> ExecutionResult
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = RoundOutcome>,
    {
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            let outcome = round(attempt).await;
            match outcome {
                RoundOutcome::FailTransient(message) => {
                    warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        error = %message,
                        "Round attempt failed"
                    );
                    last_error = message;
                }
                RoundOutcome::FailPermanent(message) => {
                    warn!(attempt = attempt + 1, error = %message, "Permanent failure, not retrying");
                    return ExecutionResult::permanent(message);
                }
                done => return done.into(),
            }

            if attempt + 1 < self.max_retries {
                let wait = self.backoff(attempt);
                info!(wait_secs = wait.as_secs_f64(), "Retrying after backoff");
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("Retry cancelled by shutdown");
                        return ExecutionResult::transient(format!("Cancelled: {last_error}"));
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        ExecutionResult::transient(format!(
            "Failed after {} retries: {}",
            self.max_retries, last_error
        ))
    }
}
