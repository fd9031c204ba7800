//! Instrument metadata and top-of-book types.

use crate::{CoreError, Price, Result, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Base decimals assumed when the venue omits them.
pub const DEFAULT_BASE_DECIMALS: u32 = 9;

/// Static trading parameters of one instrument.
///
/// Fetched once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMeta {
    /// Instrument symbol (e.g. `BTC_USDT_Perp`).
    pub instrument: String,

    /// Minimum price increment.
    pub tick_size: Price,

    /// Number of base-asset decimals. Determines the size quantum
    /// `10^-base_decimals` and the integer contract size used when signing.
    pub base_decimals: u32,

    /// Minimum order size. Zero when the venue has no minimum.
    pub min_size: Size,

    /// Minimum order notional in quote currency. Zero when unset.
    pub min_notional: Decimal,

    /// Venue asset identifier (hex-encoded instrument hash) used in signatures.
    pub asset_id: String,
}

impl InstrumentMeta {
    /// Smallest representable size increment.
    #[must_use]
    pub fn size_quantum(&self) -> Size {
        Size(Decimal::new(1, self.base_decimals))
    }

    /// Step every order size is a multiple of: `max(quantum, min_size)`.
    #[must_use]
    pub fn size_step(&self) -> Size {
        let quantum = self.size_quantum();
        if self.min_size.is_positive() && self.min_size > quantum {
            self.min_size
        } else {
            quantum
        }
    }

    /// Tolerance for comparing position deltas.
    #[must_use]
    pub fn position_tolerance(&self) -> Size {
        self.size_quantum()
    }

    /// Smallest residual imbalance worth flattening with a market order.
    #[must_use]
    pub fn flatten_threshold(&self) -> Size {
        if self.min_size.is_positive() {
            self.min_size
        } else {
            self.position_tolerance()
        }
    }

    /// Sanity-check venue-provided values.
    pub fn validate(&self) -> Result<()> {
        if self.instrument.is_empty() {
            return Err(CoreError::InvalidInstrument("empty symbol".to_string()));
        }
        if self.tick_size.0 < Decimal::ZERO {
            return Err(CoreError::InvalidInstrument(format!(
                "negative tick size {}",
                self.tick_size
            )));
        }
        if self.min_size.is_negative() || self.min_notional < Decimal::ZERO {
            return Err(CoreError::InvalidInstrument(format!(
                "negative minimums: min_size={} min_notional={}",
                self.min_size, self.min_notional
            )));
        }
        if self.base_decimals > 18 {
            return Err(CoreError::InvalidInstrument(format!(
                "base_decimals {} out of range",
                self.base_decimals
            )));
        }
        Ok(())
    }
}

/// Best bid/ask snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: Price,
    pub ask: Price,
    #[serde(default)]
    pub bid_size: Option<Size>,
    #[serde(default)]
    pub ask_size: Option<Size>,
}

impl Ticker {
    #[must_use]
    pub fn new(bid: Price, ask: Price) -> Self {
        Self {
            bid,
            ask,
            bid_size: None,
            ask_size: None,
        }
    }

    /// Both sides present and positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.bid.is_positive() && self.ask.is_positive()
    }

    /// Midpoint, or an error if either side is missing.
    pub fn mid(&self) -> Result<Price> {
        if !self.is_valid() {
            return Err(CoreError::InvalidTicker(format!(
                "bid={} ask={}",
                self.bid, self.ask
            )));
        }
        Ok(Price::mid(self.bid, self.ask))
    }

    /// Spread expressed in whole ticks, floored.
    #[must_use]
    pub fn spread_ticks(&self, tick_size: Price) -> Option<i64> {
        use rust_decimal::prelude::ToPrimitive;
        if !tick_size.is_positive() {
            return None;
        }
        ((self.ask.0 - self.bid.0) / tick_size.0).floor().to_i64()
    }
}
