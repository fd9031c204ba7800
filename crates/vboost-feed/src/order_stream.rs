//! Persistent private order stream with maker-confirmation lookups.
//!
//! One authenticated subscription per account. Raw frames from the
//! connection are normalized and handed to a single dispatcher task, which
//! is the only writer of the `OrderIndex`. Waiters register a oneshot per
//! correlation id; attribute scans wait on a `Notify` that fires on every
//! ingested event.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use vboost_core::{CorrelationId, OrderEvent, Price, Size};
use vboost_ws::{ConnectionConfig, ConnectionManager, StreamMessage, StreamSubscription};

use crate::now_ms;
use crate::order_event::normalize_order_message;

pub const ORDER_STREAM: &str = "v1.order";

/// Recent events kept for attribute matching.
pub const DEFAULT_RING_CAPACITY: usize = 400;
/// How long a seen correlation id is remembered.
pub const DEFAULT_SEEN_TTL_MS: u64 = 60_000;
/// A correlation id seen this recently confirms without waiting.
pub const DEFAULT_FAST_PATH_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct OrderStreamConfig {
    /// Authenticated trading WebSocket URL.
    pub ws_url: String,
    pub main_account_id: String,
    pub sub_account_id: String,
    /// Session cookie value sent as `Cookie: gravity=<value>`.
    pub session_cookie: String,
    /// When set, also subscribes to the instrument-scoped selector and
    /// drops events for other instruments.
    pub instrument: Option<String>,
    pub ring_capacity: usize,
    pub seen_ttl_ms: u64,
    pub fast_path_ms: u64,
}

impl OrderStreamConfig {
    pub fn new(
        ws_url: impl Into<String>,
        main_account_id: impl Into<String>,
        sub_account_id: impl Into<String>,
        session_cookie: impl Into<String>,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            main_account_id: main_account_id.into(),
            sub_account_id: sub_account_id.into(),
            session_cookie: session_cookie.into(),
            instrument: None,
            ring_capacity: DEFAULT_RING_CAPACITY,
            seen_ttl_ms: DEFAULT_SEEN_TTL_MS,
            fast_path_ms: DEFAULT_FAST_PATH_MS,
        }
    }

    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    fn selectors(&self) -> Vec<String> {
        let mut selectors = vec![self.sub_account_id.clone()];
        if let Some(instrument) = &self.instrument {
            selectors.push(format!("{}-{}", self.sub_account_id, instrument));
        }
        selectors
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Cookie".to_string(), format!("gravity={}", self.session_cookie)),
            ("X-Grvt-Account-Id".to_string(), self.main_account_id.clone()),
        ]
    }
}

// ============================================================================
// Index
// ============================================================================

#[derive(Debug, Default)]
struct IndexState {
    events: VecDeque<OrderEvent>,
    /// Correlation id -> last time it was seen resting (Unix ms).
    seen: HashMap<CorrelationId, u64>,
    waiters: HashMap<CorrelationId, Vec<oneshot::Sender<()>>>,
}

/// Bounded index of recent order events.
#[derive(Debug)]
pub struct OrderIndex {
    state: Mutex<IndexState>,
    notify: Notify,
    ring_capacity: usize,
    seen_ttl_ms: u64,
    fast_path_ms: u64,
}

impl Default for OrderIndex {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY, DEFAULT_SEEN_TTL_MS, DEFAULT_FAST_PATH_MS)
    }
}

impl OrderIndex {
    pub fn new(ring_capacity: usize, seen_ttl_ms: u64, fast_path_ms: u64) -> Self {
        Self {
            state: Mutex::new(IndexState::default()),
            notify: Notify::new(),
            ring_capacity: ring_capacity.max(1),
            seen_ttl_ms,
            fast_path_ms,
        }
    }

    /// Record one event and wake whoever is waiting on it.
    pub fn ingest(&self, event: OrderEvent) {
        let now = event.received_at_ms;
        {
            let mut state = self.state.lock();

            if event.status.is_resting() {
                if let Some(id) = event.correlation_id {
                    state.seen.insert(id, now);
                    if let Some(waiters) = state.waiters.remove(&id) {
                        for tx in waiters {
                            let _ = tx.send(());
                        }
                    }
                }
            }

            let ttl = self.seen_ttl_ms;
            state.seen.retain(|_, ts| now.saturating_sub(*ts) <= ttl);

            if state.events.len() >= self.ring_capacity {
                state.events.pop_front();
            }
            state.events.push_back(event);
        }
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seen resting within the fast-path window, or a receiver that fires
    /// when it is.
    fn register_waiter(&self, id: CorrelationId, now_ms: u64) -> Option<oneshot::Receiver<()>> {
        let mut state = self.state.lock();
        if let Some(ts) = state.seen.get(&id) {
            if now_ms.saturating_sub(*ts) < self.fast_path_ms {
                return None;
            }
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.entry(id).or_default().push(tx);
        Some(rx)
    }

    fn drop_closed_waiters(&self, id: CorrelationId) {
        let mut state = self.state.lock();
        if let Some(list) = state.waiters.get_mut(&id) {
            list.retain(|tx| !tx.is_closed());
            if list.is_empty() {
                state.waiters.remove(&id);
            }
        }
    }

    /// Wait until an event with `id` and a resting status arrives.
    pub async fn wait_for_correlation(&self, id: CorrelationId, timeout: Duration) -> bool {
        let Some(rx) = self.register_waiter(id, now_ms()) else {
            return true;
        };
        let confirmed = matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())));
        self.drop_closed_waiters(id);
        confirmed
    }

    /// Newest-first scan of the ring for a resting event that belongs to
    /// this order. An event carrying a different correlation id belongs to
    /// another order and never matches on attributes.
    pub fn find_resting(
        &self,
        correlation_id: Option<CorrelationId>,
        instrument: &str,
        size: Size,
        price: Price,
        is_buying: bool,
    ) -> bool {
        let state = self.state.lock();
        state.events.iter().rev().any(|ev| {
            if !ev.status.is_resting() || !ev.instrument.eq_ignore_ascii_case(instrument) {
                return false;
            }
            match (correlation_id, ev.correlation_id) {
                (Some(want), Some(got)) if want == got => true,
                (Some(_), Some(_)) => false,
                _ => ev.matches_attributes(instrument, size, price, is_buying),
            }
        })
    }

    /// Repeatedly scan until a match or `deadline`.
    pub async fn wait_for_attributes(
        &self,
        correlation_id: Option<CorrelationId>,
        instrument: &str,
        size: Size,
        price: Price,
        is_buying: bool,
        deadline: Instant,
    ) -> bool {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.find_resting(correlation_id, instrument, size, price, is_buying) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.find_resting(correlation_id, instrument, size, price, is_buying);
            }
        }
    }

    /// Confirm the maker order is resting.
    ///
    /// With a correlation id, waits on that id first; if it does not show up
    /// the ring is scanned once more by attributes. Without one, scans by
    /// attributes until the timeout.
    pub async fn wait_for_maker_confirm(
        &self,
        correlation_id: Option<CorrelationId>,
        instrument: &str,
        size: Size,
        price: Price,
        is_buying: bool,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        match correlation_id {
            Some(id) => {
                if self.wait_for_correlation(id, timeout).await {
                    return true;
                }
                self.find_resting(Some(id), instrument, size, price, is_buying)
            }
            None => {
                self.wait_for_attributes(None, instrument, size, price, is_buying, deadline)
                    .await
            }
        }
    }
}

// ============================================================================
// Stream
// ============================================================================

/// One account's live order stream.
pub struct OrderEventStream {
    sub_account_id: String,
    instrument: Option<String>,
    index: Arc<OrderIndex>,
    connection: Option<Arc<ConnectionManager>>,
    tasks: Vec<JoinHandle<()>>,
}

impl OrderEventStream {
    /// Connect, subscribe and start indexing.
    pub fn spawn(config: OrderStreamConfig, shutdown: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(1024);
        let ws_config = ConnectionConfig {
            url: config.ws_url.clone(),
            headers: config.headers(),
            subscriptions: vec![StreamSubscription::new(ORDER_STREAM, config.selectors())],
            ..Default::default()
        };
        let connection = Arc::new(ConnectionManager::with_shutdown_token(
            ws_config,
            tx,
            shutdown.child_token(),
        ));

        let conn = connection.clone();
        let sub = config.sub_account_id.clone();
        let connect_task = tokio::spawn(async move {
            if let Err(e) = conn.connect().await {
                warn!(sub_account = %sub, ?e, "Order stream connection terminated");
            }
        });

        let mut stream = Self::with_receiver(&config, rx);
        stream.connection = Some(connection);
        stream.tasks.push(connect_task);

        info!(
            sub_account = %config.sub_account_id,
            instrument = ?config.instrument,
            "Order event stream started"
        );
        stream
    }

    /// Index frames from an arbitrary source. `spawn` uses this with the
    /// WebSocket connection; tests feed the sender directly.
    pub fn with_receiver(config: &OrderStreamConfig, rx: mpsc::Receiver<StreamMessage>) -> Self {
        let index = Arc::new(OrderIndex::new(
            config.ring_capacity,
            config.seen_ttl_ms,
            config.fast_path_ms,
        ));
        let dispatcher = tokio::spawn(run_dispatcher(
            rx,
            index.clone(),
            config.instrument.clone(),
        ));
        Self {
            sub_account_id: config.sub_account_id.clone(),
            instrument: config.instrument.clone(),
            index,
            connection: None,
            tasks: vec![dispatcher],
        }
    }

    pub fn sub_account_id(&self) -> &str {
        &self.sub_account_id
    }

    pub fn instrument(&self) -> Option<&str> {
        self.instrument.as_deref()
    }

    pub fn index(&self) -> Arc<OrderIndex> {
        self.index.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_connected())
    }

    pub async fn wait_for_maker_confirm(
        &self,
        correlation_id: Option<CorrelationId>,
        instrument: &str,
        size: Size,
        price: Price,
        is_buying: bool,
        timeout: Duration,
    ) -> bool {
        self.index
            .wait_for_maker_confirm(correlation_id, instrument, size, price, is_buying, timeout)
            .await
    }

    pub async fn stop(self) {
        if let Some(conn) = &self.connection {
            conn.shutdown();
        }
        for task in self.tasks {
            task.abort();
            let _ = task.await;
        }
        info!(sub_account = %self.sub_account_id, "Order event stream stopped");
    }
}

async fn run_dispatcher(
    mut rx: mpsc::Receiver<StreamMessage>,
    index: Arc<OrderIndex>,
    instrument: Option<String>,
) {
    while let Some(msg) = rx.recv().await {
        match normalize_order_message(&msg.result, instrument.as_deref(), now_ms()) {
            Some(event) => {
                trace!(?event, "Order event");
                index.ingest(event);
            }
            None => debug!(result = %msg.result, "Skipping order message"),
        }
    }
    debug!("Order dispatcher channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use vboost_core::OrderStatus;

    fn event(id: Option<u32>, status: OrderStatus, size: Size, price: Price, buy: Option<bool>) -> OrderEvent {
        OrderEvent {
            correlation_id: id.map(CorrelationId),
            instrument: "ETH".to_string(),
            status,
            leg_size: Some(size),
            leg_price: Some(price),
            is_buying: buy,
            received_at_ms: now_ms(),
        }
    }

    fn sz() -> Size {
        Size::new(dec!(1))
    }

    fn px() -> Price {
        Price::new(dec!(100.2))
    }

    #[tokio::test]
    async fn test_correlation_wait_resolves_on_ingest() {
        let index = Arc::new(OrderIndex::default());
        let idx = index.clone();
        let waiter = tokio::spawn(async move {
            idx.wait_for_correlation(CorrelationId(7), Duration::from_secs(5))
                .await
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        index.ingest(event(Some(7), OrderStatus::Open, sz(), px(), Some(true)));
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_fast_path_for_recently_seen_id() {
        let index = OrderIndex::default();
        index.ingest(event(Some(9), OrderStatus::Pending, sz(), px(), Some(true)));
        assert!(
            index
                .wait_for_correlation(CorrelationId(9), Duration::from_millis(1))
                .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_correlation_wait_times_out() {
        let index = OrderIndex::default();
        index.ingest(event(Some(1), OrderStatus::Filled, sz(), px(), Some(true)));
        assert!(
            !index
                .wait_for_correlation(CorrelationId(1), Duration::from_secs(5))
                .await
        );
        assert!(index.state.lock().waiters.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_id_priority_over_attributes() {
        let index = OrderIndex::default();
        // Same attributes, different order.
        index.ingest(event(Some(555), OrderStatus::Open, sz(), px(), Some(true)));
        let confirmed = index
            .wait_for_maker_confirm(Some(CorrelationId(7)), "ETH", sz(), px(), true, Duration::from_secs(5))
            .await;
        assert!(!confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attribute_fallback_for_id_less_event() {
        let index = OrderIndex::default();
        index.ingest(event(None, OrderStatus::Open, sz(), px(), None));
        let confirmed = index
            .wait_for_maker_confirm(Some(CorrelationId(7)), "ETH", sz(), px(), true, Duration::from_secs(5))
            .await;
        assert!(confirmed);
    }

    #[tokio::test]
    async fn test_attribute_wait_without_id() {
        let index = Arc::new(OrderIndex::default());
        let idx = index.clone();
        let waiter = tokio::spawn(async move {
            idx.wait_for_maker_confirm(None, "ETH", sz(), px(), true, Duration::from_secs(5))
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Wrong side first, then the right one.
        index.ingest(event(None, OrderStatus::Open, sz(), px(), Some(false)));
        index.ingest(event(None, OrderStatus::Open, sz(), px(), Some(true)));
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn test_terminal_events_never_match() {
        let index = OrderIndex::default();
        index.ingest(event(Some(3), OrderStatus::Cancelled, sz(), px(), Some(true)));
        assert!(!index.find_resting(Some(CorrelationId(3)), "ETH", sz(), px(), true));
        assert!(!index.find_resting(None, "ETH", sz(), px(), true));
    }

    #[test]
    fn test_ring_is_bounded() {
        let index = OrderIndex::new(4, DEFAULT_SEEN_TTL_MS, DEFAULT_FAST_PATH_MS);
        for i in 0..10 {
            index.ingest(event(Some(i + 1), OrderStatus::Open, sz(), px(), Some(true)));
        }
        assert_eq!(index.len(), 4);
        assert!(!index.find_resting(Some(CorrelationId(1)), "ETH", sz(), Price::ZERO, true));
        assert!(index.find_resting(Some(CorrelationId(10)), "ETH", sz(), px(), true));
    }

    #[tokio::test]
    async fn test_stream_dispatches_raw_frames() {
        let config = OrderStreamConfig::new("ws://unused", "1", "2", "cookie").with_instrument("ETH");
        let (tx, rx) = mpsc::channel(8);
        let stream = OrderEventStream::with_receiver(&config, rx);

        let waiter = {
            let index = stream.index();
            tokio::spawn(async move {
                index
                    .wait_for_maker_confirm(
                        Some(CorrelationId(4242)),
                        "ETH",
                        Size::new(dec!(1)),
                        Price::new(dec!(100.2)),
                        true,
                        Duration::from_secs(5),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        tx.send(StreamMessage {
            stream: Some(ORDER_STREAM.to_string()),
            selector: Some("2".to_string()),
            result: json!({"feed": {"l": [{"s": "1", "lp": "100.2", "ib": true}], "m": {"co": "4242"}, "s1": {"s": "OPEN"}}}),
        })
        .await
        .unwrap();

        assert!(waiter.await.unwrap());
        assert_eq!(stream.index().len(), 1);
        assert!(!stream.is_connected());
        stream.stop().await;
    }

    #[test]
    fn test_selectors_and_headers() {
        let config = OrderStreamConfig::new("wss://x", "main", "sub", "tok").with_instrument("BTC");
        assert_eq!(config.selectors(), vec!["sub".to_string(), "sub-BTC".to_string()]);
        assert!(config
            .headers()
            .contains(&("Cookie".to_string(), "gravity=tok".to_string())));
    }
}
