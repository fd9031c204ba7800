//! Gateway traits.
//!
//! The executor talks to the venue only through these traits, so rounds can
//! be driven against `MockGateway` in tests and `RestGateway` live.

use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;
use vboost_core::{InstrumentMeta, OrderIntent, Size, Ticker};

use crate::error::GatewayResult;
use crate::types::{AccountCredentials, CreateOrderAck, OpenOrder};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Authenticated trading operations for one sub-account.
pub trait TradingGateway: Send + Sync {
    fn account(&self) -> &AccountCredentials;

    /// Sign and submit an order.
    fn create_order<'a>(&'a self, intent: &'a OrderIntent)
        -> BoxFuture<'a, GatewayResult<CreateOrderAck>>;

    /// Returns whether the venue acknowledged the cancel.
    fn cancel_order<'a>(&'a self, order_id: &'a str) -> BoxFuture<'a, GatewayResult<bool>>;

    fn cancel_all_orders(&self) -> BoxFuture<'_, GatewayResult<bool>>;

    fn open_orders<'a>(&'a self, instrument: &'a str)
        -> BoxFuture<'a, GatewayResult<Vec<OpenOrder>>>;

    /// Signed position size. An instrument without a position reads as zero.
    ///
    /// A response without the position list is an auth failure.
    fn position_size<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, GatewayResult<Size>>;

    /// Maintenance margin / equity; zero when equity is not positive.
    fn margin_ratio(&self) -> BoxFuture<'_, GatewayResult<Decimal>>;

    /// Currently configured initial leverage, if the venue reports one.
    fn initial_leverage<'a>(&'a self, instrument: &'a str)
        -> BoxFuture<'a, GatewayResult<Option<Decimal>>>;

    /// Returns whether the venue accepted the new leverage.
    fn set_initial_leverage<'a>(
        &'a self,
        instrument: &'a str,
        leverage: Decimal,
    ) -> BoxFuture<'a, GatewayResult<bool>>;
}

/// Public market-data queries.
pub trait MarketData: Send + Sync {
    fn instrument<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, GatewayResult<InstrumentMeta>>;

    fn ticker<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, GatewayResult<Ticker>>;
}

/// Arc wrapper for TradingGateway trait objects.
pub type DynTradingGateway = Arc<dyn TradingGateway>;

/// Arc wrapper for MarketData trait objects.
pub type DynMarketData = Arc<dyn MarketData>;
