//! Maker price selection.
//!
//! The taker leg is an IOC at the maker's price, so it fills against
//! whatever rests at that level first. Pricing the maker at a less crowded
//! level keeps external liquidity out of the way:
//! - spread of 2+ ticks: one tick inside the touch on our side
//! - 1-tick spread: the mid, rounded toward our side of the book
//!
//! A post-only maker must never cross, so the result is clamped to the
//! passive side of the opposite touch.

use vboost_core::{OrderSide, Price, Ticker};

/// Post-only maker price for `side` given the current touch.
#[must_use]
pub fn choose_maker_price(ticker: &Ticker, tick: Price, side: OrderSide) -> Price {
    let (bid, ask) = (ticker.bid, ticker.ask);
    if !tick.is_positive() {
        return match side {
            OrderSide::Buy => bid,
            OrderSide::Sell => ask,
        };
    }

    let spread_ticks = ticker.spread_ticks(tick).unwrap_or(0);
    let raw = if spread_ticks >= 2 {
        match side {
            OrderSide::Buy => ask - tick,
            OrderSide::Sell => bid + tick,
        }
    } else {
        let mid = Price::mid(bid, ask);
        match side {
            OrderSide::Buy => mid.floor_to_tick(tick).max(bid),
            OrderSide::Sell => mid.ceil_to_tick(tick).min(ask),
        }
    };

    match side {
        OrderSide::Buy => {
            let price = raw.floor_to_tick(tick);
            if price >= ask {
                bid.floor_to_tick(tick)
            } else {
                price
            }
        }
        OrderSide::Sell => {
            let price = raw.ceil_to_tick(tick);
            if price <= bid {
                ask.ceil_to_tick(tick)
            } else {
                price
            }
        }
    }
}
