//! Initial-leverage bump after insufficient-margin rejections.
//!
//! A low per-instrument initial leverage is the usual cause of margin
//! rejections on otherwise healthy accounts. After such a rejection the
//! executor tries progressively lower leverage candidates above the
//! current setting, at most once per interval per (sub-account, instrument).

use std::time::Duration;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{info, warn};
use vboost_gateway::TradingGateway;

/// Default minimum spacing between bumps for the same key.
pub const DEFAULT_BUMP_INTERVAL: Duration = Duration::from_secs(60);

/// Tried in order; the venue rejects values above its cap.
pub const LEVERAGE_CANDIDATES: [u32; 8] = [50, 25, 20, 15, 10, 8, 5, 3];

/// Rate limiter keyed by (sub-account, instrument).
///
/// Owned by the executor and injected at construction so separate runs do
/// not share state.
#[derive(Debug)]
pub struct LeverageBumpLimiter {
    interval_ms: u64,
    last_bump_ms: DashMap<(String, String), u64>,
}

impl Default for LeverageBumpLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BUMP_INTERVAL)
    }
}

impl LeverageBumpLimiter {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            last_bump_ms: DashMap::new(),
        }
    }

    /// Claim the bump slot for this key.
    pub fn try_acquire(&self, sub_account_id: &str, instrument: &str) -> bool {
        self.try_acquire_at(sub_account_id, instrument, now_ms())
    }

    /// Claim at the given timestamp. Returns false while the previous claim
    /// is younger than the interval.
    pub fn try_acquire_at(&self, sub_account_id: &str, instrument: &str, now_ms: u64) -> bool {
        let key = (sub_account_id.to_string(), instrument.to_string());
        let mut entry = self.last_bump_ms.entry(key).or_insert(0);
        let last = *entry;
        if last != 0 && now_ms.saturating_sub(last) < self.interval_ms {
            return false;
        }
        *entry = now_ms;
        true
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Candidates strictly above `current`, highest first.
#[must_use]
pub fn candidates_above(current: Option<Decimal>) -> Vec<Decimal> {
    LEVERAGE_CANDIDATES
        .iter()
        .map(|&c| Decimal::from(c))
        .filter(|c| current.map_or(true, |cur| *c > cur))
        .collect()
}

/// Best-effort leverage increase. Returns whether a new value was accepted.
pub async fn bump_initial_leverage(
    gateway: &dyn TradingGateway,
    instrument: &str,
    limiter: &LeverageBumpLimiter,
) -> bool {
    let account = gateway.account();
    if !limiter.try_acquire(&account.sub_account_id, instrument) {
        return false;
    }

    let current = match gateway.initial_leverage(instrument).await {
        Ok(current) => current,
        Err(e) => {
            warn!(account = %account.name, instrument, error = %e, "Failed to read initial leverage");
            None
        }
    };

    for leverage in candidates_above(current) {
        match gateway.set_initial_leverage(instrument, leverage).await {
            Ok(true) => {
                info!(
                    account = %account.name,
                    instrument,
                    from = ?current,
                    to = %leverage,
                    "Auto-set initial leverage"
                );
                return true;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(account = %account.name, instrument, %leverage, error = %e, "set_initial_leverage failed");
            }
        }
    }

    warn!(account = %account.name, instrument, current = ?current, "Auto-set initial leverage failed (no higher leverage accepted)");
    false
}
