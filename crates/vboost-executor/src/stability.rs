//! Pre-trade price stability check.

use std::time::Duration;

use vboost_core::{Price, Ticker};
use vboost_feed::PriceBuffer;
use vboost_gateway::{GatewayResult, MarketData};

/// Where the verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilitySource {
    Buffer,
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityCheck {
    pub stable: bool,
    /// Touch to price the maker against.
    pub ticker: Ticker,
    pub source: StabilitySource,
}

/// Judge stability from the live buffer when it holds enough data,
/// otherwise from two REST tickers `fallback_wait` apart: stable iff the
/// first mid still lies inside the second touch.
pub async fn check_price_stable(
    market: &dyn MarketData,
    instrument: &str,
    buffer: Option<&PriceBuffer>,
    window_ms: u64,
    fallback_wait: Duration,
) -> GatewayResult<StabilityCheck> {
    if let Some(buffer) = buffer.filter(|b| b.has_sufficient_data()) {
        if let Some(latest) = buffer.latest() {
            return Ok(StabilityCheck {
                stable: buffer.is_stable(window_ms),
                ticker: latest.ticker(),
                source: StabilitySource::Buffer,
            });
        }
    }

    let first = market.ticker(instrument).await?;
    let mid_first = Price::mid(first.bid, first.ask);
    tokio::time::sleep(fallback_wait).await;
    let second = market.ticker(instrument).await?;

    Ok(StabilityCheck {
        stable: second.bid <= mid_first && mid_first <= second.ask,
        ticker: second,
        source: StabilitySource::Rest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vboost_gateway::MockMarketData;

    fn quote(bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> Ticker {
        Ticker::new(Price::new(bid), Price::new(ask))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rest_fallback_stable() {
        let md = MockMarketData::new();
        md.push_ticker(quote(dec!(100.0), dec!(100.2)));
        md.push_ticker(quote(dec!(100.0), dec!(100.3)));

        let check = check_price_stable(&md, "BTC", None, 2_000, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(check.stable);
        assert_eq!(check.source, StabilitySource::Rest);
        assert_eq!(check.ticker.ask, Price::new(dec!(100.3)));
        assert_eq!(md.ticker_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rest_fallback_unstable_when_touch_moved() {
        let md = MockMarketData::new();
        md.push_ticker(quote(dec!(100.0), dec!(100.2)));
        md.push_ticker(quote(dec!(100.5), dec!(100.7)));

        let check = check_price_stable(&md, "BTC", None, 2_000, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!check.stable);
    }

    #[tokio::test]
    async fn test_buffer_used_when_sufficient() {
        let md = MockMarketData::new();
        let buffer = PriceBuffer::default();
        let now = chrono::Utc::now().timestamp_millis() as u64;
        for offset in [1_800, 900, 0] {
            buffer.push_at(Price::new(dec!(100.0)), Price::new(dec!(100.2)), now - offset);
        }

        let check = check_price_stable(&md, "BTC", Some(&buffer), 2_000, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(check.stable);
        assert_eq!(check.source, StabilitySource::Buffer);
        assert_eq!(check.ticker.bid, Price::new(dec!(100.0)));
        assert_eq!(md.ticker_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_thin_buffer_falls_back_to_rest() {
        let md = MockMarketData::new();
        md.push_ticker(quote(dec!(1), dec!(2)));
        let buffer = PriceBuffer::default();
        buffer.push(Price::new(dec!(1)), Price::new(dec!(2)));

        let check = check_price_stable(&md, "BTC", Some(&buffer), 2_000, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(check.source, StabilitySource::Rest);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rest_error_propagates() {
        let md = MockMarketData::new();
        assert!(check_price_stable(&md, "BTC", None, 2_000, Duration::from_secs(1))
            .await
            .is_err());
    }
}
