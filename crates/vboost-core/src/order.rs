//! Order-related types and identifiers.
//!
//! Provides order side, time-in-force, correlation id, the outbound
//! `OrderIntent` and the normalized inbound `OrderEvent`.

use crate::{Price, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn from_is_buying(is_buying: bool) -> Self {
        if is_buying {
            Self::Buy
        } else {
            Self::Sell
        }
    }

    pub fn is_buying(&self) -> bool {
        matches!(self, Self::Buy)
    }

    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Time-in-force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Rests until expiry. Used for the post-only maker leg.
    #[default]
    GoodTillTime,
    /// Fills what it can immediately, rest is cancelled. Used for the taker leg.
    ImmediateOrCancel,
}

impl TimeInForce {
    /// Numeric code used inside the signed order payload.
    pub fn venue_code(&self) -> u8 {
        match self {
            Self::GoodTillTime => 1,
            Self::ImmediateOrCancel => 3,
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoodTillTime => write!(f, "GOOD_TILL_TIME"),
            Self::ImmediateOrCancel => write!(f, "IMMEDIATE_OR_CANCEL"),
        }
    }
}

/// Client-chosen correlation id attached to every order.
///
/// A random 32-bit value. It doubles as the signature nonce and comes back
/// on the order stream, which is how the maker leg is confirmed. Unique per
/// intent in practice, not guaranteed collision-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u32);

impl CorrelationId {
    /// Draw a fresh random id. Zero is skipped since venues treat it as unset.
    pub fn random() -> Self {
        loop {
            let id: u32 = rand::random();
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// An order we intend to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub instrument: String,
    pub size: Size,
    pub side: OrderSide,
    /// Limit price. Zero means market order.
    pub price: Price,
    pub correlation_id: CorrelationId,
    pub reduce_only: bool,
    pub post_only: bool,
    pub time_in_force: TimeInForce,
}

impl OrderIntent {
    /// Post-only good-till-time limit order: the maker leg.
    #[must_use]
    pub fn maker(
        instrument: impl Into<String>,
        side: OrderSide,
        price: Price,
        size: Size,
        reduce_only: bool,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            size,
            side,
            price,
            correlation_id: CorrelationId::random(),
            reduce_only,
            post_only: true,
            time_in_force: TimeInForce::GoodTillTime,
        }
    }

    /// Immediate-or-cancel limit order: the taker leg.
    #[must_use]
    pub fn taker(
        instrument: impl Into<String>,
        side: OrderSide,
        price: Price,
        size: Size,
        reduce_only: bool,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            size,
            side,
            price,
            correlation_id: CorrelationId::random(),
            reduce_only,
            post_only: false,
            time_in_force: TimeInForce::ImmediateOrCancel,
        }
    }

    /// Reduce-only market order used to flatten residual exposure.
    #[must_use]
    pub fn market_reduce_only(instrument: impl Into<String>, side: OrderSide, size: Size) -> Self {
        Self {
            instrument: instrument.into(),
            size,
            side,
            price: Price::ZERO,
            correlation_id: CorrelationId::random(),
            reduce_only: true,
            post_only: false,
            time_in_force: TimeInForce::ImmediateOrCancel,
        }
    }

    pub fn is_market(&self) -> bool {
        self.price.is_zero()
    }

    pub fn is_buying(&self) -> bool {
        self.side.is_buying()
    }
}

/// Order lifecycle status as reported by the order stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Pending or open: the order is (about to be) resting on the book.
    pub fn is_resting(&self) -> bool {
        matches!(self, Self::Pending | Self::Open)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_resting()
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "OPEN" => Ok(Self::Open),
            "FILLED" => Ok(Self::Filled),
            "CANCELLED" | "CANCELED" => Ok(Self::Cancelled),
            "REJECTED" => Ok(Self::Rejected),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Open => "OPEN",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// Canonical order update, normalized from whatever payload shape the
/// stream delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub correlation_id: Option<CorrelationId>,
    pub instrument: String,
    pub status: OrderStatus,
    pub leg_size: Option<Size>,
    pub leg_price: Option<Price>,
    pub is_buying: Option<bool>,
    /// Local receive time (Unix milliseconds).
    pub received_at_ms: u64,
}

impl OrderEvent {
    /// True when instrument, leg size and leg price agree with the given
    /// order. A side flag, when present, must agree too; some payload
    /// versions omit it.
    pub fn matches_attributes(
        &self,
        instrument: &str,
        size: Size,
        price: Price,
        is_buying: bool,
    ) -> bool {
        self.instrument.eq_ignore_ascii_case(instrument)
            && self.leg_size == Some(size)
            && self.leg_price == Some(price)
            && self.is_buying.map_or(true, |b| b == is_buying)
    }
}
