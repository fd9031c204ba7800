//! Time-windowed buffer of top-of-book samples.
//!
//! The ticker listener pushes every update here; the executor asks whether
//! the external mid has stayed inside the current touch for the last couple
//! of seconds before it places a maker order. Price levels where our own
//! maker orders rest are registered so they do not count as external
//! movement.
//!
//! Every time-dependent method has an `*_at(now_ms)` variant for tests.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use vboost_core::{Price, Ticker};

use crate::now_ms;

/// Samples older than this are dropped.
pub const DEFAULT_MAX_AGE_MS: u64 = 3_000;
/// Minimum number of samples before stability can be judged.
pub const MIN_SAMPLES: usize = 3;
/// Minimum time span the buffered samples must cover.
pub const MIN_SPAN_MS: u64 = 1_500;
/// Samples that must fall inside the stability window itself.
pub const MIN_WINDOW_SAMPLES: usize = 2;

/// Two prices closer than this are the same level.
const OWN_PRICE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 7);

/// One ticker observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    pub timestamp_ms: u64,
    pub bid: Price,
    pub ask: Price,
}

impl PriceSample {
    pub fn mid(&self) -> Price {
        Price::mid(self.bid, self.ask)
    }

    pub fn ticker(&self) -> Ticker {
        Ticker::new(self.bid, self.ask)
    }
}

#[derive(Debug, Default)]
struct Inner {
    samples: VecDeque<PriceSample>,
    own_prices: Vec<Price>,
}

impl Inner {
    fn prune(&mut self, now_ms: u64, max_age_ms: u64) {
        let cutoff = now_ms.saturating_sub(max_age_ms);
        while self
            .samples
            .front()
            .is_some_and(|s| s.timestamp_ms < cutoff)
        {
            self.samples.pop_front();
        }
    }

    fn is_own_price(&self, price: Price) -> bool {
        self.own_prices
            .iter()
            .any(|own| (price.0 - own.0).abs() < OWN_PRICE_TOLERANCE)
    }
}

/// Thread-safe ring of recent samples.
#[derive(Debug)]
pub struct PriceBuffer {
    max_age_ms: u64,
    inner: Mutex<Inner>,
}

impl Default for PriceBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE_MS)
    }
}

impl PriceBuffer {
    pub fn new(max_age_ms: u64) -> Self {
        Self {
            max_age_ms,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn push(&self, bid: Price, ask: Price) {
        self.push_at(bid, ask, now_ms());
    }

    pub fn push_at(&self, bid: Price, ask: Price, now_ms: u64) {
        let mut inner = self.inner.lock();
        inner.samples.push_back(PriceSample {
            timestamp_ms: now_ms,
            bid,
            ask,
        });
        inner.prune(now_ms, self.max_age_ms);
    }

    /// Mark a price level as one of our resting maker orders.
    pub fn register_own_price(&self, price: Price) {
        let mut inner = self.inner.lock();
        if !inner.is_own_price(price) {
            inner.own_prices.push(price);
        }
    }

    pub fn unregister_own_price(&self, price: Price) {
        self.inner
            .lock()
            .own_prices
            .retain(|own| (price.0 - own.0).abs() >= OWN_PRICE_TOLERANCE);
    }

    pub fn clear_own_prices(&self) {
        self.inner.lock().own_prices.clear();
    }

    pub fn latest(&self) -> Option<PriceSample> {
        self.latest_at(now_ms())
    }

    pub fn latest_at(&self, now_ms: u64) -> Option<PriceSample> {
        let mut inner = self.inner.lock();
        inner.prune(now_ms, self.max_age_ms);
        inner.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// At least `MIN_SAMPLES` samples spanning at least `MIN_SPAN_MS`.
    pub fn has_sufficient_data(&self) -> bool {
        self.has_sufficient_data_at(now_ms())
    }

    pub fn has_sufficient_data_at(&self, now_ms: u64) -> bool {
        let mut inner = self.inner.lock();
        inner.prune(now_ms, self.max_age_ms);
        Self::sufficient(&inner, now_ms)
    }

    fn sufficient(inner: &Inner, now_ms: u64) -> bool {
        match inner.samples.front() {
            Some(oldest) if inner.samples.len() >= MIN_SAMPLES => {
                now_ms.saturating_sub(oldest.timestamp_ms) >= MIN_SPAN_MS
            }
            _ => false,
        }
    }

    /// Whether every non-own sample in the last `window_ms` had its mid
    /// inside the latest sample's `[bid, ask]`.
    ///
    /// Always false until the buffer holds enough data, and false when
    /// fewer than `MIN_WINDOW_SAMPLES` samples fall inside the window.
    pub fn is_stable(&self, window_ms: u64) -> bool {
        self.is_stable_at(window_ms, now_ms())
    }

    pub fn is_stable_at(&self, window_ms: u64, now_ms: u64) -> bool {
        let mut inner = self.inner.lock();
        inner.prune(now_ms, self.max_age_ms);

        if !Self::sufficient(&inner, now_ms) {
            return false;
        }

        let cutoff = now_ms.saturating_sub(window_ms);
        let window: Vec<PriceSample> = inner
            .samples
            .iter()
            .filter(|s| s.timestamp_ms >= cutoff)
            .copied()
            .collect();
        if window.len() < MIN_WINDOW_SAMPLES {
            return false;
        }
        let latest = window[window.len() - 1];

        window
            .iter()
            .filter(|s| !inner.is_own_price(s.bid) && !inner.is_own_price(s.ask))
            .all(|s| {
                let mid = s.mid();
                mid >= latest.bid && mid <= latest.ask
            })
    }

    /// Spread of the latest sample in whole ticks.
    pub fn spread_ticks(&self, tick_size: Price) -> Option<i64> {
        self.latest().and_then(|s| s.ticker().spread_ticks(tick_size))
    }
}
