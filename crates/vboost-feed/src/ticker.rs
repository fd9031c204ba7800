//! Ticker payload parsing.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use vboost_core::{Price, Size, Ticker};

fn decimal_field(feed: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter().find_map(|k| match feed.get(*k)? {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    })
}

/// Extract top of book from a ticker stream result or REST ticker body.
///
/// Accepts the object itself or one wrapped in `feed`. Returns `None`
/// unless both sides are present and positive.
pub fn parse_ticker(result: &Value) -> Option<Ticker> {
    let feed = result.get("feed").unwrap_or(result);
    let bid = decimal_field(feed, &["best_bid_price", "bid", "bb"])?;
    let ask = decimal_field(feed, &["best_ask_price", "ask", "ba"])?;

    let ticker = Ticker {
        bid: Price::new(bid),
        ask: Price::new(ask),
        bid_size: decimal_field(feed, &["best_bid_size", "bb1"]).map(Size::new),
        ask_size: decimal_field(feed, &["best_ask_size", "ba1"]).map(Size::new),
    };
    ticker.is_valid().then_some(ticker)
}
