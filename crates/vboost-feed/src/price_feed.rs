//! Background ticker listener feeding a `PriceBuffer`.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vboost_ws::{ConnectionConfig, ConnectionManager, StreamMessage, StreamSubscription};

use crate::price_buffer::{PriceBuffer, DEFAULT_MAX_AGE_MS};
use crate::ticker::parse_ticker;

pub const TICKER_STREAM: &str = "v1.ticker.s";

#[derive(Debug, Clone)]
pub struct PriceFeedConfig {
    /// Public market-data WebSocket URL.
    pub ws_url: String,
    pub instrument: String,
    pub max_age_ms: u64,
}

impl PriceFeedConfig {
    pub fn new(ws_url: impl Into<String>, instrument: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            instrument: instrument.into(),
            max_age_ms: DEFAULT_MAX_AGE_MS,
        }
    }
}

/// Live price feed for one instrument.
pub struct PriceFeed {
    instrument: String,
    buffer: Arc<PriceBuffer>,
    connection: Arc<ConnectionManager>,
    tasks: Vec<JoinHandle<()>>,
}

impl PriceFeed {
    /// Connect to the ticker stream and start filling the buffer.
    ///
    /// Both background tasks end when `shutdown` is cancelled.
    pub fn spawn(config: PriceFeedConfig, shutdown: CancellationToken) -> Self {
        let buffer = Arc::new(PriceBuffer::new(config.max_age_ms));
        let (tx, rx) = mpsc::channel(256);

        let ws_config = ConnectionConfig {
            url: config.ws_url.clone(),
            subscriptions: vec![StreamSubscription::new(
                TICKER_STREAM,
                vec![config.instrument.clone()],
            )],
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 5_000,
            ..Default::default()
        };
        let connection = Arc::new(ConnectionManager::with_shutdown_token(
            ws_config,
            tx,
            shutdown.child_token(),
        ));

        let conn = connection.clone();
        let connect_task = tokio::spawn(async move {
            if let Err(e) = conn.connect().await {
                warn!(?e, "Ticker connection terminated");
            }
        });
        let listen_task = tokio::spawn(run_listener(rx, buffer.clone()));

        info!(instrument = %config.instrument, url = %config.ws_url, "Price feed started");

        Self {
            instrument: config.instrument,
            buffer,
            connection,
            tasks: vec![connect_task, listen_task],
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Shared buffer; the executor reads stability from it.
    pub fn buffer(&self) -> Arc<PriceBuffer> {
        self.buffer.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn is_price_stable(&self, window_ms: u64) -> bool {
        self.buffer.is_stable(window_ms)
    }

    /// The listener only ends when the channel closes, and the connection
    /// holds the sender, so both tasks are aborted rather than joined.
    pub async fn stop(self) {
        self.connection.shutdown();
        for task in self.tasks {
            task.abort();
            let _ = task.await;
        }
        info!(instrument = %self.instrument, "Price feed stopped");
    }
}

/// Drain ticker messages into the buffer until the channel closes.
pub(crate) async fn run_listener(mut rx: mpsc::Receiver<StreamMessage>, buffer: Arc<PriceBuffer>) {
    while let Some(msg) = rx.recv().await {
        match parse_ticker(&msg.result) {
            Some(ticker) => buffer.push(ticker.bid, ticker.ask),
            None => debug!(result = %msg.result, "Ticker message without usable bid/ask"),
        }
    }
}
