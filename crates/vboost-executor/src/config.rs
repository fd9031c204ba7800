//! Executor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelPolicy;

/// Timings of one round. All durations in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// How long to wait for the maker order to appear on the order stream.
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    /// How long to poll positions for the fills to show up.
    #[serde(default = "default_reconcile_window_ms")]
    pub reconcile_window_ms: u64,
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,
    /// Look-back of the buffered stability check.
    #[serde(default = "default_stability_window_ms")]
    pub stability_window_ms: u64,
    /// Gap between the two tickers of the REST stability fallback.
    #[serde(default = "default_fallback_stability_wait_ms")]
    pub fallback_stability_wait_ms: u64,
    /// Price off a single REST ticker without any stability check.
    #[serde(default)]
    pub skip_stability: bool,
    #[serde(default = "default_cancel_attempts")]
    pub cancel_attempts: u32,
    #[serde(default = "default_cancel_settle_ms")]
    pub cancel_settle_ms: u64,
    #[serde(default = "default_cancel_retry_delay_ms")]
    pub cancel_retry_delay_ms: u64,
    /// Wait after the flatten order before re-reading positions.
    #[serde(default = "default_recovery_settle_ms")]
    pub recovery_settle_ms: u64,
    /// Minimum spacing of leverage bumps per (sub-account, instrument).
    #[serde(default = "default_leverage_bump_interval_ms")]
    pub leverage_bump_interval_ms: u64,
}

fn default_confirm_timeout_ms() -> u64 {
    5_000
}

fn default_reconcile_window_ms() -> u64 {
    2_000
}

fn default_reconcile_interval_ms() -> u64 {
    200
}

fn default_stability_window_ms() -> u64 {
    2_000
}

fn default_fallback_stability_wait_ms() -> u64 {
    1_000
}

fn default_cancel_attempts() -> u32 {
    3
}

fn default_cancel_settle_ms() -> u64 {
    300
}

fn default_cancel_retry_delay_ms() -> u64 {
    500
}

fn default_recovery_settle_ms() -> u64 {
    300
}

fn default_leverage_bump_interval_ms() -> u64 {
    60_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: default_confirm_timeout_ms(),
            reconcile_window_ms: default_reconcile_window_ms(),
            reconcile_interval_ms: default_reconcile_interval_ms(),
            stability_window_ms: default_stability_window_ms(),
            fallback_stability_wait_ms: default_fallback_stability_wait_ms(),
            skip_stability: false,
            cancel_attempts: default_cancel_attempts(),
            cancel_settle_ms: default_cancel_settle_ms(),
            cancel_retry_delay_ms: default_cancel_retry_delay_ms(),
            recovery_settle_ms: default_recovery_settle_ms(),
            leverage_bump_interval_ms: default_leverage_bump_interval_ms(),
        }
    }
}

impl ExecutorConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn reconcile_window(&self) -> Duration {
        Duration::from_millis(self.reconcile_window_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn fallback_stability_wait(&self) -> Duration {
        Duration::from_millis(self.fallback_stability_wait_ms)
    }

    pub fn recovery_settle(&self) -> Duration {
        Duration::from_millis(self.recovery_settle_ms)
    }

    pub fn leverage_bump_interval(&self) -> Duration {
        Duration::from_millis(self.leverage_bump_interval_ms)
    }

    pub fn cancel_policy(&self) -> CancelPolicy {
        CancelPolicy {
            attempts: self.cancel_attempts.max(1),
            settle: Duration::from_millis(self.cancel_settle_ms),
            retry_delay: Duration::from_millis(self.cancel_retry_delay_ms),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.confirm_timeout_ms == 0 {
            return Err("confirm_timeout_ms must be positive".to_string());
        }
        if self.reconcile_interval_ms == 0 || self.reconcile_interval_ms > self.reconcile_window_ms {
            return Err(format!(
                "reconcile_interval_ms ({}) must be in 1..=reconcile_window_ms ({})",
                self.reconcile_interval_ms, self.reconcile_window_ms
            ));
        }
        if self.stability_window_ms == 0 {
            return Err("stability_window_ms must be positive".to_string());
        }
        Ok(())
    }
}
