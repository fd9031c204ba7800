//! In-memory gateway doubles for executor and orchestration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rust_decimal::Decimal;
use vboost_core::{InstrumentMeta, OrderIntent, Size, Ticker};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{BoxFuture, MarketData, TradingGateway};
use crate::types::{AccountCredentials, CreateOrderAck, OpenOrder};

/// Called on every accepted `create_order`. Returns the signed position
/// change to apply to this account, if any.
pub type CreateHook = Box<dyn Fn(&OrderIntent) -> Option<Size> + Send + Sync>;

#[derive(Default)]
struct MockState {
    orders: Vec<OrderIntent>,
    /// Scripted `create_order` failures, consumed in order.
    create_failures: VecDeque<GatewayError>,
    cancels: Vec<String>,
    cancel_all_calls: usize,
    open_orders: Vec<OpenOrder>,
    open_order_queries: usize,
    /// Resting orders that survive this many cancel attempts.
    sticky_cancels: usize,
    position: Size,
    position_reads: usize,
    fail_position_reads: bool,
    margin_ratio: Decimal,
    leverage: Option<Decimal>,
    /// `set_initial_leverage` accepts values up to this cap.
    max_leverage: Option<Decimal>,
    leverage_sets: Vec<Decimal>,
}

/// Mock trading gateway for testing.
///
/// Accepted orders are recorded. Market orders fill in full against the
/// mock's own position unless a create hook decides otherwise; limit orders
/// only fill through the hook.
pub struct MockGateway {
    account: AccountCredentials,
    state: Mutex<MockState>,
    on_create: Mutex<Option<CreateHook>>,
    next_id: AtomicU64,
}

impl MockGateway {
    pub fn new(name: &str) -> Self {
        Self {
            account: AccountCredentials::new(name, format!("main-{name}"), "1", "cookie"),
            state: Mutex::new(MockState::default()),
            on_create: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn set_on_create(&self, hook: CreateHook) {
        *self.on_create.lock() = Some(hook);
    }

    /// Queue an error for the next `create_order`.
    pub fn push_create_failure(&self, error: GatewayError) {
        self.state.lock().create_failures.push_back(error);
    }

    pub fn set_position(&self, size: Size) {
        self.state.lock().position = size;
    }

    pub fn adjust_position(&self, delta: Size) {
        let mut state = self.state.lock();
        state.position = state.position + delta;
    }

    pub fn position(&self) -> Size {
        self.state.lock().position
    }

    pub fn set_fail_position_reads(&self, fail: bool) {
        self.state.lock().fail_position_reads = fail;
    }

    pub fn set_margin_ratio(&self, ratio: Decimal) {
        self.state.lock().margin_ratio = ratio;
    }

    pub fn set_leverage(&self, current: Option<Decimal>, max: Option<Decimal>) {
        let mut state = self.state.lock();
        state.leverage = current;
        state.max_leverage = max;
    }

    /// Add a resting order that ignores the first `sticky` cancels.
    pub fn add_open_order(&self, order: OpenOrder, sticky: usize) {
        let mut state = self.state.lock();
        state.open_orders.push(order);
        state.sticky_cancels = sticky;
    }

    pub fn orders(&self) -> Vec<OrderIntent> {
        self.state.lock().orders.clone()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.state.lock().cancels.clone()
    }

    pub fn cancel_all_calls(&self) -> usize {
        self.state.lock().cancel_all_calls
    }

    pub fn open_order_queries(&self) -> usize {
        self.state.lock().open_order_queries
    }

    pub fn open_orders_snapshot(&self) -> Vec<OpenOrder> {
        self.state.lock().open_orders.clone()
    }

    pub fn position_reads(&self) -> usize {
        self.state.lock().position_reads
    }

    pub fn leverage_sets(&self) -> Vec<Decimal> {
        self.state.lock().leverage_sets.clone()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.orders.clear();
        state.cancels.clear();
        state.cancel_all_calls = 0;
        state.open_order_queries = 0;
        state.position_reads = 0;
    }
}

impl TradingGateway for MockGateway {
    fn account(&self) -> &AccountCredentials {
        &self.account
    }

    fn create_order<'a>(
        &'a self,
        intent: &'a OrderIntent,
    ) -> BoxFuture<'a, GatewayResult<CreateOrderAck>> {
        Box::pin(async move {
            if let Some(err) = self.state.lock().create_failures.pop_front() {
                return Err(err);
            }

            let delta = match self.on_create.lock().as_ref() {
                Some(hook) => hook(intent),
                None if intent.is_market() => Some(if intent.is_buying() {
                    intent.size
                } else {
                    -intent.size
                }),
                None => None,
            };

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let order_id = format!("0x{id:x}");
            let mut state = self.state.lock();
            state.orders.push(intent.clone());
            if let Some(delta) = delta {
                state.position = state.position + delta;
            }
            Ok(CreateOrderAck::new(Some(order_id), intent.correlation_id))
        })
    }

    fn cancel_order<'a>(&'a self, order_id: &'a str) -> BoxFuture<'a, GatewayResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.cancels.push(order_id.to_string());
            if state.sticky_cancels > 0 {
                state.sticky_cancels -= 1;
                return Ok(true);
            }
            state.open_orders.retain(|o| o.order_id != order_id);
            Ok(true)
        })
    }

    fn cancel_all_orders(&self) -> BoxFuture<'_, GatewayResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.cancel_all_calls += 1;
            state.open_orders.clear();
            Ok(true)
        })
    }

    fn open_orders<'a>(
        &'a self,
        instrument: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Vec<OpenOrder>>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.open_order_queries += 1;
            Ok(state
                .open_orders
                .iter()
                .filter(|o| o.instrument.as_deref().map_or(true, |i| i == instrument))
                .cloned()
                .collect())
        })
    }

    fn position_size<'a>(&'a self, _instrument: &'a str) -> BoxFuture<'a, GatewayResult<Size>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.position_reads += 1;
            if state.fail_position_reads {
                return Err(GatewayError::Auth("positions response without result".into()));
            }
            Ok(state.position)
        })
    }

    fn margin_ratio(&self) -> BoxFuture<'_, GatewayResult<Decimal>> {
        Box::pin(async move { Ok(self.state.lock().margin_ratio) })
    }

    fn initial_leverage<'a>(
        &'a self,
        _instrument: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Option<Decimal>>> {
        Box::pin(async move { Ok(self.state.lock().leverage) })
    }

    fn set_initial_leverage<'a>(
        &'a self,
        _instrument: &'a str,
        leverage: Decimal,
    ) -> BoxFuture<'a, GatewayResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.leverage_sets.push(leverage);
            let accepted = state.max_leverage.map_or(true, |max| leverage <= max);
            if accepted {
                state.leverage = Some(leverage);
            }
            Ok(accepted)
        })
    }
}

/// Mock market data with settable tickers.
#[derive(Default)]
pub struct MockMarketData {
    instruments: Mutex<HashMap<String, InstrumentMeta>>,
    /// Tickers returned in order; the last one repeats.
    tickers: Mutex<VecDeque<Ticker>>,
    ticker_calls: AtomicU64,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instrument(&self, meta: InstrumentMeta) {
        self.instruments
            .lock()
            .insert(meta.instrument.clone(), meta);
    }

    pub fn push_ticker(&self, ticker: Ticker) {
        self.tickers.lock().push_back(ticker);
    }

    pub fn ticker_calls(&self) -> u64 {
        self.ticker_calls.load(Ordering::SeqCst)
    }
}

impl MarketData for MockMarketData {
    fn instrument<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, GatewayResult<InstrumentMeta>> {
        Box::pin(async move {
            self.instruments
                .lock()
                .get(instrument)
                .cloned()
                .ok_or_else(|| GatewayError::UnknownInstrument(instrument.to_string()))
        })
    }

    fn ticker<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, GatewayResult<Ticker>> {
        Box::pin(async move {
            self.ticker_calls.fetch_add(1, Ordering::SeqCst);
            let mut tickers = self.tickers.lock();
            let ticker = if tickers.len() > 1 {
                tickers.pop_front()
            } else {
                tickers.front().copied()
            };
            ticker.ok_or_else(|| GatewayError::Parse(format!("{instrument}: no ticker")))
        })
    }
}
