//! Integration tests for vboost-bot.
//!
//! These tests run the live stream components against a local server:
//! - WebSocket connection lifecycle and auth headers
//! - Order stream confirmation end to end
//! - Price feed stability from pushed tickers

pub mod common;
