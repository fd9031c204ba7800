//! Cancels that are verified against the open-orders list.
//!
//! A cancel acknowledgement does not guarantee the order has left the book,
//! and a stray resting maker would be hit by the next round's taker.

use std::time::Duration;

use tracing::{debug, warn};
use vboost_gateway::TradingGateway;

/// Timing of verified cancels.
#[derive(Debug, Clone, Copy)]
pub struct CancelPolicy {
    pub attempts: u32,
    /// Wait after sending cancels before re-reading open orders.
    pub settle: Duration,
    /// Extra wait before the next attempt.
    pub retry_delay: Duration,
}

impl Default for CancelPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            settle: Duration::from_millis(300),
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Cancel one order and confirm it no longer rests.
pub async fn cancel_verified(
    gateway: &dyn TradingGateway,
    order_id: &str,
    instrument: &str,
    policy: CancelPolicy,
) -> bool {
    let account = &gateway.account().name;
    for attempt in 1..=policy.attempts {
        if let Err(e) = gateway.cancel_order(order_id).await {
            debug!(account = %account, order_id, error = %e, "cancel_order failed");
        }
        tokio::time::sleep(policy.settle).await;

        match gateway.open_orders(instrument).await {
            Ok(open) => {
                if !open.iter().any(|o| o.order_id == order_id) {
                    if attempt > 1 {
                        debug!(account = %account, order_id, attempt, "Order cancelled after retries");
                    }
                    return true;
                }
                debug!(account = %account, order_id, attempt, "Order still open after cancel");
            }
            Err(e) => {
                debug!(account = %account, attempt, error = %e, "Failed to check open orders");
                continue;
            }
        }
        tokio::time::sleep(policy.retry_delay).await;
    }

    warn!(account = %account, order_id, attempts = policy.attempts, "Failed to cancel order");
    false
}

/// Cancel everything resting on `instrument` until the book is clear of
/// our orders. Returns whether the final check found nothing open.
pub async fn clear_open_orders(
    gateway: &dyn TradingGateway,
    instrument: &str,
    policy: CancelPolicy,
) -> bool {
    let account = &gateway.account().name;
    for attempt in 1..=policy.attempts {
        let open = match gateway.open_orders(instrument).await {
            Ok(open) => open,
            Err(e) => {
                debug!(account = %account, attempt, error = %e, "Failed to list open orders");
                tokio::time::sleep(policy.retry_delay).await;
                continue;
            }
        };
        if open.is_empty() {
            return true;
        }

        debug!(account = %account, count = open.len(), attempt, "Cancelling open orders");
        for order in &open {
            if let Err(e) = gateway.cancel_order(&order.order_id).await {
                debug!(account = %account, order_id = %order.order_id, error = %e, "cancel_order failed");
            }
        }
        tokio::time::sleep(policy.settle).await;
    }

    match gateway.open_orders(instrument).await {
        Ok(open) if open.is_empty() => true,
        Ok(open) => {
            warn!(account = %account, remaining = open.len(), "Open orders remain after cancel");
            false
        }
        Err(e) => {
            warn!(account = %account, error = %e, "Could not verify open orders");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vboost_gateway::{MockGateway, OpenOrder};

    #[tokio::test(start_paused = true)]
    async fn test_cancel_verified_first_try() {
        let gw = MockGateway::new("A");
        gw.add_open_order(OpenOrder::new("0x1"), 0);
        assert!(cancel_verified(&gw, "0x1", "BTC", CancelPolicy::default()).await);
        assert_eq!(gw.cancels(), vec!["0x1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_verified_retries_sticky_order() {
        let gw = MockGateway::new("A");
        gw.add_open_order(OpenOrder::new("0x1"), 2);
        assert!(cancel_verified(&gw, "0x1", "BTC", CancelPolicy::default()).await);
        assert_eq!(gw.cancels().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_verified_gives_up() {
        let gw = MockGateway::new("A");
        gw.add_open_order(OpenOrder::new("0x1"), 10);
        assert!(!cancel_verified(&gw, "0x1", "BTC", CancelPolicy::default()).await);
        assert_eq!(gw.cancels().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_open_orders() {
        let gw = MockGateway::new("A");
        gw.add_open_order(OpenOrder::new("0x1"), 0);
        gw.add_open_order(OpenOrder::new("0x2"), 0);
        assert!(clear_open_orders(&gw, "BTC", CancelPolicy::default()).await);
        assert!(gw.open_orders_snapshot().is_empty());

        // Nothing open: a single query, no cancels
        gw.clear();
        assert!(clear_open_orders(&gw, "BTC", CancelPolicy::default()).await);
        assert_eq!(gw.open_order_queries(), 1);
        assert!(gw.cancels().is_empty());
    }
}
