//! Venue access for the paired volume executor.
//!
//! - `TradingGateway`: authenticated order and account operations for one
//!   sub-account (`RestGateway` live, `MockGateway` in tests)
//! - `MarketData`: instrument metadata and tickers (`RestMarketData`,
//!   `MockMarketData`)
//! - `OrderSigner`: EIP-712 signatures embedded in every order

pub mod error;
pub mod gateway;
pub mod mock;
pub mod rest;
pub mod signer;
pub mod types;

pub use error::{GatewayError, GatewayResult};
pub use gateway::{BoxFuture, DynMarketData, DynTradingGateway, MarketData, TradingGateway};
pub use mock::{CreateHook, MockGateway, MockMarketData};
pub use rest::{RestGateway, RestGatewayConfig, RestMarketData};
pub use signer::{
    load_signer, Eip712OrderSigner, KeyError, KeySource, OrderSignature, OrderSigner,
    SignableOrder,
};
pub use types::{is_real_order_id, AccountCredentials, CreateOrderAck, OpenOrder};
