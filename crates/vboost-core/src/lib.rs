//! Core domain types for the paired volume executor.
//!
//! This crate provides the types shared by every other crate:
//! - `Price`, `Size`: precision-safe numeric types
//! - `InstrumentMeta`, `Ticker`: venue metadata and top of book
//! - `OrderIntent`, `OrderEvent`: what we send and what the stream reports
//! - `RoundOutcome`, `ExecutionResult`: results of one maker/taker round
//! - `sizing`: size quantization against tick, step and minimums

pub mod decimal;
pub mod error;
pub mod execution;
pub mod instrument;
pub mod order;
pub mod sizing;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use instrument::{InstrumentMeta, Ticker, DEFAULT_BASE_DECIMALS};
pub use order::{CorrelationId, OrderEvent, OrderIntent, OrderSide, OrderStatus, TimeInForce};
pub use sizing::{normalize_size, size_from_notional, NotionalSizing};

// Execution types
pub use execution::{DeltaPair, ExecutionResult, RoundOutcome, EXTERNAL_FILL_WARNING};
