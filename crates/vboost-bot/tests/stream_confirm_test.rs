//! Order stream and price feed against a local server.

mod integration;
use integration::common::mock_ws::MockWsServer;

use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use vboost_core::{CorrelationId, Price, Size};
use vboost_feed::{OrderEventStream, OrderStreamConfig, PriceFeed, PriceFeedConfig};

const INSTRUMENT: &str = "BTC_USDT_Perp";

fn order_frame(client_order_id: u32, instrument: &str, status: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "subscription",
        "params": {
            "stream": "v1.order",
            "selector": "111",
            "result": {"feed": {
                "order_id": "0x01",
                "legs": [{
                    "instrument": instrument,
                    "size": "0.01",
                    "limit_price": "65000.5",
                    "is_buying_asset": true
                }],
                "metadata": {"client_order_id": client_order_id.to_string()},
                "state": {"status": status}
            }}
        }
    })
}

async fn connected_stream(server: &MockWsServer, token: &CancellationToken) -> OrderEventStream {
    let stream = OrderEventStream::spawn(
        OrderStreamConfig::new(server.url(), "ACC1", "111", "cookie-1").with_instrument(INSTRUMENT),
        token.clone(),
    );
    timeout(Duration::from_secs(2), server.wait_for_subscriptions(1))
        .await
        .expect("order stream subscribes");
    stream
}

#[tokio::test]
async fn test_order_stream_subscribes_with_account_selectors() {
    let server = MockWsServer::start().await;
    let token = CancellationToken::new();
    let stream = connected_stream(&server, &token).await;

    let subs = server.wait_for_subscriptions(1).await;
    assert_eq!(subs[0]["params"]["stream"], "v1.order");
    assert_eq!(
        subs[0]["params"]["selectors"],
        json!(["111", "111-BTC_USDT_Perp"])
    );
    assert_eq!(server.header("cookie").await.as_deref(), Some("gravity=cookie-1"));
    assert_eq!(server.header("x-grvt-account-id").await.as_deref(), Some("ACC1"));

    stream.stop().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_maker_confirmed_by_correlation_id() {
    let server = MockWsServer::start().await;
    let token = CancellationToken::new();
    let stream = connected_stream(&server, &token).await;
    let index = stream.index();

    let waiter = tokio::spawn(async move {
        index
            .wait_for_maker_confirm(
                Some(CorrelationId(4242)),
                INSTRUMENT,
                Size::new(dec!(0.01)),
                Price::new(dec!(65000.5)),
                true,
                Duration::from_secs(3),
            )
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    server.push(order_frame(4242, INSTRUMENT, "OPEN"));

    assert!(waiter.await.unwrap(), "open event should confirm the maker");
    assert!(stream.index().len() >= 1);

    stream.stop().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_other_instrument_does_not_confirm() {
    let server = MockWsServer::start().await;
    let token = CancellationToken::new();
    let stream = connected_stream(&server, &token).await;

    server.push(order_frame(77, "ETH_USDT_Perp", "OPEN"));
    let confirmed = stream
        .wait_for_maker_confirm(
            Some(CorrelationId(77)),
            INSTRUMENT,
            Size::new(dec!(0.01)),
            Price::new(dec!(65000.5)),
            true,
            Duration::from_millis(300),
        )
        .await;
    assert!(!confirmed);

    stream.stop().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_price_feed_fills_buffer() {
    let server = MockWsServer::start().await;
    let token = CancellationToken::new();
    let feed = PriceFeed::spawn(PriceFeedConfig::new(server.url(), INSTRUMENT), token.clone());

    let subs = timeout(Duration::from_secs(2), server.wait_for_subscriptions(1))
        .await
        .expect("feed subscribes");
    assert_eq!(subs[0]["params"]["stream"], "v1.ticker.s");
    assert_eq!(subs[0]["params"]["selectors"], json!([INSTRUMENT]));

    server.push(json!({
        "jsonrpc": "2.0",
        "method": "subscription",
        "params": {
            "stream": "v1.ticker.s",
            "selector": INSTRUMENT,
            "result": {"feed": {"best_bid_price": "100.0", "best_ask_price": "100.2"}}
        }
    }));

    let buffer = feed.buffer();
    let sample = timeout(Duration::from_secs(2), async {
        loop {
            if let Some(sample) = buffer.latest() {
                return sample;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("ticker lands in buffer");
    assert_eq!(sample.mid(), Price::new(dec!(100.1)));

    token.cancel();
    feed.stop().await;
    server.shutdown().await;
}
