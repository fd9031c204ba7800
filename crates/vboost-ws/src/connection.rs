//! WebSocket connection manager.
//!
//! Handles connection lifecycle, automatic reconnection with exponential
//! backoff, and re-subscription after every reconnect. Stream payloads are
//! forwarded on an mpsc channel; acknowledgements and heartbeats are
//! consumed here.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::{classify, Inbound, RpcRequest, StreamMessage, StreamSubscription};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Extra headers on the upgrade request (session cookie, account id).
    pub headers: Vec<(String, String)>,
    /// Streams to subscribe to after every connect.
    pub subscriptions: Vec<StreamSubscription>,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Upper bound of random jitter added to each backoff.
    pub reconnect_jitter_ms: u64,
    /// Silence after which a ping is sent.
    pub heartbeat_interval_ms: u64,
    /// Pong must arrive within this.
    pub heartbeat_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: Vec::new(),
            subscriptions: Vec::new(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 5000,
            reconnect_jitter_ms: 250,
            heartbeat_interval_ms: 20000,
            heartbeat_timeout_ms: 10000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// WebSocket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: RwLock<ConnectionState>,
    heartbeat: HeartbeatManager,
    message_tx: mpsc::Sender<StreamMessage>,
    reconnect_count: RwLock<u32>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, message_tx: mpsc::Sender<StreamMessage>) -> Self {
        Self::with_shutdown_token(config, message_tx, CancellationToken::new())
    }

    /// Create a manager that stops when `shutdown_token` is cancelled.
    pub fn with_shutdown_token(
        config: ConnectionConfig,
        message_tx: mpsc::Sender<StreamMessage>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let heartbeat =
            HeartbeatManager::new(config.heartbeat_interval_ms, config.heartbeat_timeout_ms);
        Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            heartbeat,
            message_tx,
            reconnect_count: RwLock::new(0),
            shutdown_token,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    /// Signal graceful shutdown of both the message loop and reconnect loop.
    pub fn shutdown(&self) {
        info!(url = %self.config.url, "ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and run the message loop, reconnecting until shutdown or
    /// until `max_reconnect_attempts` is exhausted.
    pub async fn connect(&self) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            *self.state.write() = ConnectionState::Connecting;

            match self.try_connect().await {
                Ok(()) => info!(url = %self.config.url, "WebSocket connection closed"),
                Err(e) => error!(url = %self.config.url, ?e, "WebSocket connection error"),
            }

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            attempt += 1;
            *self.reconnect_count.write() = attempt;

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                *self.state.write() = ConnectionState::Disconnected;
                return Err(WsError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            *self.state.write() = ConnectionState::Reconnecting;

            let delay = self.calculate_backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to WebSocket");

        let mut request = self.config.url.as_str().into_client_request()?;
        for (name, value) in &self.config.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| WsError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| WsError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            request.headers_mut().insert(header_name, header_value);
        }

        let (ws_stream, _response) =
            connect_async_tls_with_config(request, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Connected;
        info!(url = %self.config.url, "WebSocket connected");

        for (idx, sub) in self.config.subscriptions.iter().enumerate() {
            let text = serde_json::to_string(&RpcRequest::subscribe(sub, idx as u64 + 1))?;
            write.send(Message::Text(text)).await?;
            info!(stream = %sub.stream, selectors = ?sub.selectors, "Subscribe sent");
        }

        self.heartbeat.reset();

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_message();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(?e, "WebSocket read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                () = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        error!("Heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_ping() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        debug!("Sent heartbeat ping");
                    }
                }
            }
        }
    }

    async fn handle_text_message(&self, text: &str) -> WsResult<()> {
        self.heartbeat.record_message();

        let inbound = match classify(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                debug!(?e, "Ignoring non-JSON frame");
                return Ok(());
            }
        };

        match inbound {
            Inbound::Ack { id } => {
                debug!(id, "Subscription acknowledged");
            }
            Inbound::Error { code, message } => {
                warn!(code, %message, "Stream error");
                return Err(WsError::SubscriptionRejected { code, message });
            }
            Inbound::Data(msg) => {
                if self.message_tx.send(msg).await.is_err() {
                    warn!("Message receiver dropped");
                }
            }
        }

        Ok(())
    }

    /// `base * 2^(attempt-1)`, capped at the configured maximum, plus jitter.
    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;

        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent).min(max);

        let jitter = if self.config.reconnect_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.config.reconnect_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(delay + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(config: ConnectionConfig) -> ConnectionManager {
        let (tx, _rx) = mpsc::channel(1);
        ConnectionManager::new(config, tx)
    }

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0);
        assert!(config.subscriptions.is_empty());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let m = manager(ConnectionConfig {
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 3000,
            reconnect_jitter_ms: 0,
            ..Default::default()
        });
        assert_eq!(m.calculate_backoff_delay(1), Duration::from_millis(500));
        assert_eq!(m.calculate_backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(m.calculate_backoff_delay(3), Duration::from_millis(2000));
        assert_eq!(m.calculate_backoff_delay(4), Duration::from_millis(3000));
        assert_eq!(m.calculate_backoff_delay(40), Duration::from_millis(3000));
    }

    #[test]
    fn test_backoff_jitter_bounded() {
        let m = manager(ConnectionConfig {
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 100,
            reconnect_jitter_ms: 50,
            ..Default::default()
        });
        for _ in 0..20 {
            let d = m.calculate_backoff_delay(1).as_millis();
            assert!((100..=150).contains(&d));
        }
    }

    #[tokio::test]
    async fn test_shutdown_before_connect_returns_immediately() {
        let m = manager(ConnectionConfig {
            url: "ws://127.0.0.1:1".to_string(),
            ..Default::default()
        });
        m.shutdown();
        assert!(m.connect().await.is_ok());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let m = manager(ConnectionConfig {
            url: "ws://127.0.0.1:1".to_string(),
            max_reconnect_attempts: 1,
            ..Default::default()
        });
        assert!(matches!(m.connect().await, Err(WsError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_invalid_header_is_reported() {
        let m = manager(ConnectionConfig {
            url: "ws://127.0.0.1:1".to_string(),
            headers: vec![("Bad Header".to_string(), "x".to_string())],
            ..Default::default()
        });
        assert!(matches!(
            m.try_connect().await,
            Err(WsError::InvalidHeader { .. })
        ));
    }
}
