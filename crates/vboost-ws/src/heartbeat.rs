//! Heartbeat tracking for WebSocket connections.
//!
//! A ping is only sent after `interval` of silence, and the connection is
//! considered dead if the matching pong does not arrive within `timeout`.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct State {
    last_message: Instant,
    ping_sent_at: Option<Instant>,
}

/// Heartbeat monitor for one connection.
#[derive(Debug)]
pub struct HeartbeatManager {
    interval: Duration,
    timeout: Duration,
    state: Mutex<State>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
            state: Mutex::new(State {
                last_message: Instant::now(),
                ping_sent_at: None,
            }),
        }
    }

    /// Reset on (re)connect.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.last_message = Instant::now();
        state.ping_sent_at = None;
    }

    pub fn record_ping(&self) {
        self.state.lock().ping_sent_at = Some(Instant::now());
    }

    pub fn record_pong(&self) {
        let mut state = self.state.lock();
        if let Some(sent) = state.ping_sent_at.take() {
            debug!(rtt_ms = sent.elapsed().as_millis() as u64, "Received pong");
        }
        state.last_message = Instant::now();
    }

    /// Any inbound frame counts as liveness.
    pub fn record_message(&self) {
        self.state.lock().last_message = Instant::now();
    }

    pub fn is_timed_out(&self) -> bool {
        self.state
            .lock()
            .ping_sent_at
            .is_some_and(|sent| sent.elapsed() > self.timeout)
    }

    pub fn should_send_ping(&self) -> bool {
        let state = self.state.lock();
        state.ping_sent_at.is_none() && state.last_message.elapsed() >= self.interval
    }

    /// Sleep until the next check is due.
    pub async fn wait_for_check(&self) {
        tokio::time::sleep(self.interval / 2).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ping_due_after_silence() {
        let hb = HeartbeatManager::new(1000, 500);
        assert!(!hb.should_send_ping());

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(hb.should_send_ping());

        hb.record_ping();
        assert!(!hb.should_send_ping());
        assert!(!hb.is_timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_timeout() {
        let hb = HeartbeatManager::new(1000, 500);
        hb.record_ping();
        tokio::time::advance(Duration::from_millis(501)).await;
        assert!(hb.is_timed_out());

        hb.record_pong();
        assert!(!hb.is_timed_out());
    }
}
