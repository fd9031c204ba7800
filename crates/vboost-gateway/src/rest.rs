//! REST implementations of the gateway traits.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use vboost_core::{
    CorrelationId, InstrumentMeta, OrderIntent, Price, Size, Ticker, DEFAULT_BASE_DECIMALS,
};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{BoxFuture, MarketData, TradingGateway};
use crate::signer::{OrderSigner, SignableOrder, ORDER_EXPIRY_NS};
use crate::types::{AccountCredentials, CreateOrderAck, OpenOrder};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// `create_order` attempts against 503 / transport failures.
pub const CREATE_ORDER_ATTEMPTS: u32 = 3;
pub const CREATE_ORDER_RETRY_DELAY: Duration = Duration::from_secs(1);

fn build_client() -> GatewayResult<Client> {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| GatewayError::Http(format!("Failed to create HTTP client: {e}")))
}

// ============================================================================
// JSON helpers
// ============================================================================

/// Decimal from a JSON string or number.
pub(crate) fn decimal_field(value: &Value, key: &str) -> Option<Decimal> {
    match value.get(key)? {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match value.get(*k)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Best-effort order id from the varying response shapes.
pub(crate) fn extract_order_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => string_field(value, &["oid", "order_id", "id", "oi"]).or_else(|| {
            ["r", "result", "data", "state", "feed"]
                .iter()
                .filter_map(|k| value.get(*k))
                .find_map(extract_order_id)
        }),
        Value::Array(items) => items.iter().find_map(extract_order_id),
        _ => None,
    }
}

fn parse_open_order(value: &Value) -> Option<OpenOrder> {
    let order_id = string_field(value, &["order_id", "oid", "id"])?;
    let leg = value
        .get("legs")
        .or_else(|| value.get("l"))
        .and_then(|l| l.get(0));
    let correlation_id = value
        .get("metadata")
        .or_else(|| value.get("m"))
        .and_then(|m| string_field(m, &["client_order_id", "co"]))
        .and_then(|co| CorrelationId::from_str(&co).ok());

    Some(OpenOrder {
        order_id,
        instrument: leg
            .and_then(|l| string_field(l, &["instrument", "i"]))
            .or_else(|| string_field(value, &["instrument"])),
        correlation_id,
        size: leg.and_then(|l| decimal_field(l, "size")).map(Size::new),
        price: leg
            .and_then(|l| decimal_field(l, "limit_price"))
            .map(Price::new),
        is_buying: leg.and_then(|l| {
            l.get("is_buying_asset")
                .or_else(|| l.get("ib"))
                .and_then(Value::as_bool)
        }),
    })
}

/// Ticker from a `/full/v1/ticker` result.
pub(crate) fn parse_rest_ticker(result: &Value) -> Option<Ticker> {
    let mut ticker = Ticker::new(
        Price::new(decimal_field(result, "best_bid_price")?),
        Price::new(decimal_field(result, "best_ask_price")?),
    );
    ticker.bid_size = decimal_field(result, "best_bid_size").map(Size::new);
    ticker.ask_size = decimal_field(result, "best_ask_size").map(Size::new);
    ticker.is_valid().then_some(ticker)
}

/// Instrument metadata from a `/full/v1/instrument` result.
pub(crate) fn parse_instrument(name: &str, result: &Value) -> GatewayResult<InstrumentMeta> {
    let tick_size = decimal_field(result, "tick_size")
        .ok_or_else(|| GatewayError::Parse(format!("{name}: missing tick_size")))?;
    let base_decimals = result
        .get("base_decimals")
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .map_or(DEFAULT_BASE_DECIMALS, |d| d as u32);
    let asset_id = string_field(result, &["instrument_hash"])
        .ok_or_else(|| GatewayError::Parse(format!("{name}: missing instrument_hash")))?;

    let meta = InstrumentMeta {
        instrument: string_field(result, &["instrument"]).unwrap_or_else(|| name.to_string()),
        tick_size: Price::new(tick_size),
        base_decimals,
        min_size: Size::new(decimal_field(result, "min_size").unwrap_or_default()),
        min_notional: decimal_field(result, "min_notional").unwrap_or_default(),
        asset_id,
    };
    meta.validate()
        .map_err(|e| GatewayError::Parse(format!("{name}: {e}")))?;
    Ok(meta)
}

// ============================================================================
// Trading
// ============================================================================

/// Connection settings for `RestGateway`.
#[derive(Debug, Clone)]
pub struct RestGatewayConfig {
    /// Trades REST base URL (e.g. `https://trades.grvt.io`).
    pub trades_url: String,
    /// Web origin sent as `Origin`/`Referer`.
    pub origin: String,
    pub create_attempts: u32,
    pub create_retry_delay: Duration,
}

impl RestGatewayConfig {
    pub fn new(trades_url: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            trades_url: trades_url.into(),
            origin: origin.into(),
            create_attempts: CREATE_ORDER_ATTEMPTS,
            create_retry_delay: CREATE_ORDER_RETRY_DELAY,
        }
    }
}

/// Trading gateway for one account over the venue's web REST API.
pub struct RestGateway {
    client: Client,
    config: RestGatewayConfig,
    account: AccountCredentials,
    signer: Arc<dyn OrderSigner>,
    /// Metadata needed to convert sizes and prices for signing.
    instruments: RwLock<HashMap<String, InstrumentMeta>>,
}

impl RestGateway {
    pub fn new(
        config: RestGatewayConfig,
        account: AccountCredentials,
        signer: Arc<dyn OrderSigner>,
    ) -> GatewayResult<Self> {
        Ok(Self {
            client: build_client()?,
            config,
            account,
            signer,
            instruments: RwLock::new(HashMap::new()),
        })
    }

    /// Make an instrument tradable through this gateway.
    pub fn register_instrument(&self, meta: InstrumentMeta) {
        self.instruments
            .write()
            .insert(meta.instrument.clone(), meta);
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Origin", self.config.origin.clone()),
            ("Referer", format!("{}/", self.config.origin)),
            ("X-Api-Source", "WEB".to_string()),
            ("X-Grvt-Account-Id", self.account.main_account_id.clone()),
            ("Cookie", format!("gravity={}", self.account.session_cookie)),
        ]
    }

    async fn send(&self, path: &str, payload: &Value) -> Result<(StatusCode, Value), reqwest::Error> {
        let mut request = self
            .client
            .post(format!("{}{}", self.config.trades_url, path))
            .json(payload);
        for (name, value) in self.headers() {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        // Non-JSON bodies (gateway error pages) surface as a string value
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok((status, body))
    }

    async fn post(&self, path: &str, payload: Value) -> GatewayResult<(StatusCode, Value)> {
        let (status, body) = self
            .send(path, &payload)
            .await
            .map_err(|e| GatewayError::Http(format!("{path}: {e}")))?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GatewayError::Auth(format!("{path}: HTTP {status}")));
        }
        Ok((status, body))
    }

    /// `result` of an authenticated `full` endpoint. Missing means the
    /// session was not accepted.
    fn require_result<'b>(path: &str, body: &'b Value) -> GatewayResult<&'b Value> {
        body.get("result")
            .ok_or_else(|| GatewayError::Auth(format!("{path}: response without result")))
    }

    fn order_payload(&self, intent: &OrderIntent, signature: Value) -> Value {
        let limit_price = if intent.is_market() {
            "0".to_string()
        } else {
            intent.price.normalized().to_string()
        };
        json!({
            "o": {
                "sa": self.account.sub_account_id,
                "im": intent.is_market(),
                "ti": intent.time_in_force.to_string(),
                "po": intent.post_only,
                "ro": intent.reduce_only,
                "l": [{
                    "i": intent.instrument,
                    "s": intent.size.normalized().to_string(),
                    "lp": limit_price,
                    "ib": intent.is_buying(),
                }],
                "s": signature,
                "m": {"s": "WEB", "co": intent.correlation_id.to_string()},
            }
        })
    }

    fn interpret_create(
        status: StatusCode,
        body: &Value,
        intent: &OrderIntent,
    ) -> GatewayResult<CreateOrderAck> {
        if let Some(r) = body.get("r").or_else(|| body.get("result")).filter(|r| !r.is_null()) {
            return Ok(CreateOrderAck::new(
                extract_order_id(r),
                intent.correlation_id,
            ));
        }
        if let Some(code) = body.get("c").and_then(Value::as_i64) {
            let message = body
                .get("m")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(GatewayError::Rejected { code, message });
        }
        Err(GatewayError::Http(format!("create_order HTTP {status}: {body}")))
    }
}

impl TradingGateway for RestGateway {
    fn account(&self) -> &AccountCredentials {
        &self.account
    }

    fn create_order<'a>(
        &'a self,
        intent: &'a OrderIntent,
    ) -> BoxFuture<'a, GatewayResult<CreateOrderAck>> {
        Box::pin(async move {
            let meta = self
                .instruments
                .read()
                .get(&intent.instrument)
                .cloned()
                .ok_or_else(|| GatewayError::UnknownInstrument(intent.instrument.clone()))?;

            let expiration_ns = chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or(i64::MAX - ORDER_EXPIRY_NS)
                .saturating_add(ORDER_EXPIRY_NS);
            let signable = SignableOrder::from_intent(
                &self.account.sub_account_id,
                intent,
                &meta,
                expiration_ns,
            )?;
            let signature = self.signer.sign_order(&signable).await?;
            let payload = self.order_payload(intent, signature.to_wire());

            let mut last_error = String::new();
            for attempt in 1..=self.config.create_attempts.max(1) {
                match self.send("/lite/v1/create_order", &payload).await {
                    Ok((status, _)) if status == StatusCode::SERVICE_UNAVAILABLE => {
                        last_error = "HTTP 503".to_string();
                    }
                    Ok((status, _))
                        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
                    {
                        return Err(GatewayError::Auth(format!("create_order: HTTP {status}")));
                    }
                    Ok((status, body)) => {
                        let result = Self::interpret_create(status, &body, intent);
                        debug!(
                            account = %self.account.name,
                            correlation_id = %intent.correlation_id,
                            %status,
                            ok = result.is_ok(),
                            "create_order response"
                        );
                        return result;
                    }
                    Err(e) => {
                        last_error = e.to_string();
                    }
                }
                warn!(
                    account = %self.account.name,
                    attempt,
                    error = %last_error,
                    "create_order failed, retrying"
                );
                if attempt < self.config.create_attempts {
                    tokio::time::sleep(self.config.create_retry_delay).await;
                }
            }
            Err(GatewayError::Unavailable(format!("create_order: {last_error}")))
        })
    }

    fn cancel_order<'a>(&'a self, order_id: &'a str) -> BoxFuture<'a, GatewayResult<bool>> {
        Box::pin(async move {
            let (status, body) = self
                .post(
                    "/full/v1/cancel_order",
                    json!({"order_id": order_id, "sub_account_id": self.account.sub_account_id}),
                )
                .await?;
            Ok(status.is_success() && body.get("result").is_some())
        })
    }

    fn cancel_all_orders(&self) -> BoxFuture<'_, GatewayResult<bool>> {
        Box::pin(async move {
            let (status, _) = self
                .post(
                    "/full/v1/cancel_all_orders",
                    json!({"sub_account_id": self.account.sub_account_id}),
                )
                .await?;
            Ok(status.is_success())
        })
    }

    fn open_orders<'a>(
        &'a self,
        instrument: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Vec<OpenOrder>>> {
        Box::pin(async move {
            let (_, body) = self
                .post(
                    "/full/v1/open_orders",
                    json!({"sub_account_id": self.account.sub_account_id, "instrument": instrument}),
                )
                .await?;
            let orders = body
                .get("result")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(parse_open_order).collect())
                .unwrap_or_default();
            Ok(orders)
        })
    }

    fn position_size<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, GatewayResult<Size>> {
        Box::pin(async move {
            let path = "/full/v1/positions";
            let (_, body) = self
                .post(path, json!({"sub_account_id": self.account.sub_account_id}))
                .await?;
            let positions = Self::require_result(path, &body)?
                .as_array()
                .ok_or_else(|| GatewayError::Parse(format!("{path}: result is not a list")))?;

            let size = positions
                .iter()
                .find(|p| p.get("instrument").and_then(Value::as_str) == Some(instrument))
                .and_then(|p| decimal_field(p, "size"))
                .unwrap_or_default();
            Ok(Size::new(size))
        })
    }

    fn margin_ratio(&self) -> BoxFuture<'_, GatewayResult<Decimal>> {
        Box::pin(async move {
            let path = "/full/v1/account_summary";
            let (_, body) = self
                .post(path, json!({"sub_account_id": self.account.sub_account_id}))
                .await?;
            let summary = Self::require_result(path, &body)?;
            let equity = decimal_field(summary, "total_equity")
                .or_else(|| decimal_field(summary, "equity"))
                .unwrap_or_default();
            let margin = decimal_field(summary, "maintenance_margin").unwrap_or_default();
            if equity <= Decimal::ZERO {
                return Ok(Decimal::ZERO);
            }
            Ok(margin / equity)
        })
    }

    fn initial_leverage<'a>(
        &'a self,
        instrument: &'a str,
    ) -> BoxFuture<'a, GatewayResult<Option<Decimal>>> {
        Box::pin(async move {
            let (_, body) = self
                .post(
                    "/lite/v1/get_all_initial_leverage",
                    json!({"sa": self.account.sub_account_id}),
                )
                .await?;
            let items = body
                .get("r")
                .and_then(Value::as_array)
                .or_else(|| body.get("result").and_then(Value::as_array));
            let leverage = items.and_then(|items| {
                items
                    .iter()
                    .find(|it| string_field(it, &["i", "instrument"]).as_deref() == Some(instrument))
                    .and_then(|it| decimal_field(it, "l").or_else(|| decimal_field(it, "leverage")))
            });
            Ok(leverage)
        })
    }

    fn set_initial_leverage<'a>(
        &'a self,
        instrument: &'a str,
        leverage: Decimal,
    ) -> BoxFuture<'a, GatewayResult<bool>> {
        Box::pin(async move {
            let (status, body) = self
                .post(
                    "/lite/v1/set_initial_leverage",
                    json!({
                        "sa": self.account.sub_account_id,
                        "i": instrument,
                        "l": leverage.normalize().to_string(),
                    }),
                )
                .await?;
            if !status.is_success() || !body.is_object() {
                return Ok(false);
            }
            let accepted = body.get("s").and_then(Value::as_bool) == Some(true)
                || body.get("r").is_some()
                || body.get("result").is_some();
            if accepted {
                info!(account = %self.account.name, instrument, %leverage, "Initial leverage set");
            }
            Ok(accepted)
        })
    }
}

// ============================================================================
// Market data
// ============================================================================

/// Public market-data REST client.
pub struct RestMarketData {
    client: Client,
    base_url: String,
}

impl RestMarketData {
    pub fn new(base_url: impl Into<String>) -> GatewayResult<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
        })
    }

    async fn result(&self, path: &str, instrument: &str) -> GatewayResult<Value> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&json!({"instrument": instrument}))
            .send()
            .await
            .map_err(|e| GatewayError::Http(format!("{path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http(format!("{path}: HTTP {status}: {body}")));
        }
        let mut body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(format!("{path}: {e}")))?;
        match body.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(GatewayError::Parse(format!("{path}: response without result"))),
        }
    }
}

impl MarketData for RestMarketData {
    fn instrument<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, GatewayResult<InstrumentMeta>> {
        Box::pin(async move {
            let result = self.result("/full/v1/instrument", instrument).await?;
            if result.as_object().map_or(true, |o| o.is_empty()) {
                return Err(GatewayError::UnknownInstrument(instrument.to_string()));
            }
            parse_instrument(instrument, &result)
        })
    }

    fn ticker<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, GatewayResult<Ticker>> {
        Box::pin(async move {
            let result = self.result("/full/v1/ticker", instrument).await?;
            parse_rest_ticker(&result)
                .ok_or_else(|| GatewayError::Parse(format!("{instrument}: ticker without bid/ask")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vboost_core::OrderSide;

    #[test]
    fn test_extract_order_id_shapes() {
        assert_eq!(extract_order_id(&json!("0x1")), Some("0x1".to_string()));
        assert_eq!(extract_order_id(&json!({"oid": "0x2"})), Some("0x2".to_string()));
        assert_eq!(
            extract_order_id(&json!({"state": {"order_id": "0x3"}})),
            Some("0x3".to_string())
        );
        assert_eq!(extract_order_id(&json!([{}, {"id": 4}])), Some("4".to_string()));
        assert_eq!(extract_order_id(&json!({"x": 1})), None);
    }

    #[test]
    fn test_parse_open_order_full_shape() {
        let order = parse_open_order(&json!({
            "order_id": "0xabc",
            "legs": [{"instrument": "ETH_USDT_Perp", "size": "0.5", "limit_price": "2500.1", "is_buying_asset": true}],
            "metadata": {"client_order_id": "77"}
        }))
        .unwrap();
        assert_eq!(order.order_id, "0xabc");
        assert_eq!(order.instrument.as_deref(), Some("ETH_USDT_Perp"));
        assert_eq!(order.correlation_id, Some(CorrelationId(77)));
        assert_eq!(order.size, Some(Size::new(dec!(0.5))));
        assert_eq!(order.price, Some(Price::new(dec!(2500.1))));
        assert_eq!(order.is_buying, Some(true));
    }

    #[test]
    fn test_parse_open_order_without_id_skipped() {
        assert!(parse_open_order(&json!({"legs": []})).is_none());
    }

    #[test]
    fn test_parse_instrument() {
        let meta = parse_instrument(
            "BTC_USDT_Perp",
            &json!({
                "instrument": "BTC_USDT_Perp",
                "tick_size": "0.1",
                "base_decimals": 9,
                "min_size": "0.001",
                "min_notional": "100",
                "instrument_hash": "0x030501"
            }),
        )
        .unwrap();
        assert_eq!(meta.tick_size, Price::new(dec!(0.1)));
        assert_eq!(meta.base_decimals, 9);
        assert_eq!(meta.min_size, Size::new(dec!(0.001)));
        assert_eq!(meta.min_notional, dec!(100));
    }

    #[test]
    fn test_parse_instrument_defaults() {
        let meta = parse_instrument(
            "X",
            &json!({"tick_size": 0.5, "instrument_hash": "0x01"}),
        )
        .unwrap();
        assert_eq!(meta.instrument, "X");
        assert_eq!(meta.base_decimals, DEFAULT_BASE_DECIMALS);
        assert!(meta.min_size.is_zero());
        assert!(parse_instrument("X", &json!({"tick_size": "0.1"})).is_err());
    }

    #[test]
    fn test_parse_rest_ticker() {
        let t = parse_rest_ticker(&json!({
            "best_bid_price": "100.0",
            "best_ask_price": "100.3",
            "best_bid_size": "4"
        }))
        .unwrap();
        assert_eq!(t.bid, Price::new(dec!(100.0)));
        assert_eq!(t.bid_size, Some(Size::new(dec!(4))));
        assert_eq!(t.ask_size, None);
        assert!(parse_rest_ticker(&json!({"best_bid_price": "1"})).is_none());
    }

    #[test]
    fn test_interpret_create() {
        let intent = OrderIntent::taker(
            "BTC_USDT_Perp",
            OrderSide::Sell,
            Price::new(dec!(100)),
            Size::new(dec!(1)),
            false,
        );
        let ack = RestGateway::interpret_create(StatusCode::OK, &json!({"r": {"oi": "0x9"}}), &intent)
            .unwrap();
        assert_eq!(ack.order_id.as_deref(), Some("0x9"));
        assert_eq!(ack.correlation_id, intent.correlation_id);

        let placeholder =
            RestGateway::interpret_create(StatusCode::OK, &json!({"r": {"oid": "0x00"}}), &intent)
                .unwrap();
        assert_eq!(placeholder.order_id, None);

        let err = RestGateway::interpret_create(
            StatusCode::BAD_REQUEST,
            &json!({"c": 2080, "m": "insufficient margin"}),
            &intent,
        )
        .unwrap_err();
        assert_eq!(err.code(), Some(2080));
    }
}
