//! JSON-RPC framing for venue streams.
//!
//! Outbound we only ever send `subscribe` requests. Inbound frames are one
//! of: a subscribe acknowledgement (carries our request `id`), an error, or
//! a stream payload. Stream payloads arrive either wrapped in
//! `params.result`, as a bare `result`, or as the message itself depending
//! on the endpoint, so `classify` unwraps all three.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stream plus the selectors to subscribe to on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSubscription {
    /// Stream name, e.g. `v1.ticker.s` or `v1.order`.
    pub stream: String,
    pub selectors: Vec<String>,
}

impl StreamSubscription {
    pub fn new(stream: impl Into<String>, selectors: Vec<String>) -> Self {
        Self {
            stream: stream.into(),
            selectors,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct SubscribeParams<'a> {
    stream: &'a str,
    selectors: &'a [String],
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: SubscribeParams<'a>,
    id: u64,
}

impl<'a> RpcRequest<'a> {
    pub fn subscribe(sub: &'a StreamSubscription, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method: "subscribe",
            params: SubscribeParams {
                stream: &sub.stream,
                selectors: &sub.selectors,
            },
            id,
        }
    }
}

/// Stream payload forwarded to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMessage {
    pub stream: Option<String>,
    pub selector: Option<String>,
    /// The unwrapped result object.
    pub result: Value,
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Ack { id: u64 },
    Error { code: i64, message: String },
    Data(StreamMessage),
}

/// Parse and classify one text frame.
pub fn classify(text: &str) -> serde_json::Result<Inbound> {
    let value: Value = serde_json::from_str(text)?;

    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(Inbound::Error { code, message });
    }

    let has_params = value.get("params").is_some();
    if !has_params {
        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            return Ok(Inbound::Ack { id });
        }
    }

    let params = value.get("params");
    let stream = params
        .and_then(|p| p.get("stream"))
        .or_else(|| value.get("stream"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let selector = params
        .and_then(|p| p.get("selector"))
        .or_else(|| value.get("selector"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let result = match params.and_then(|p| p.get("result")) {
        Some(r) => r.clone(),
        None => match value.get("result") {
            Some(r) => r.clone(),
            None => value,
        },
    };

    Ok(Inbound::Data(StreamMessage {
        stream,
        selector,
        result,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_request_shape() {
        let sub = StreamSubscription::new("v1.order", vec!["123".into(), "123-BTC_USDT_Perp".into()]);
        let text = serde_json::to_string(&RpcRequest::subscribe(&sub, 1)).unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            v,
            json!({
                "jsonrpc": "2.0",
                "method": "subscribe",
                "params": {"stream": "v1.order", "selectors": ["123", "123-BTC_USDT_Perp"]},
                "id": 1
            })
        );
    }

    #[test]
    fn test_classify_ack() {
        let raw = r#"{"jsonrpc":"2.0","result":{"stream":"v1.order","subs":["123"]},"id":1}"#;
        assert_eq!(classify(raw).unwrap(), Inbound::Ack { id: 1 });
    }

    #[test]
    fn test_classify_error() {
        let raw = r#"{"jsonrpc":"2.0","error":{"code":1000,"message":"unauthenticated"},"id":1}"#;
        assert_eq!(
            classify(raw).unwrap(),
            Inbound::Error {
                code: 1000,
                message: "unauthenticated".to_string()
            }
        );
    }

    #[test]
    fn test_classify_params_result() {
        let raw = r#"{"jsonrpc":"2.0","method":"subscription","params":{"stream":"v1.ticker.s","selector":"ETH","result":{"feed":{"best_bid_price":"1"}}}}"#;
        match classify(raw).unwrap() {
            Inbound::Data(msg) => {
                assert_eq!(msg.stream.as_deref(), Some("v1.ticker.s"));
                assert_eq!(msg.selector.as_deref(), Some("ETH"));
                assert_eq!(msg.result, json!({"feed": {"best_bid_price": "1"}}));
            }
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_bare_feed() {
        let raw = r#"{"stream":"v1.order","feed":{"state":{"status":"OPEN"}}}"#;
        match classify(raw).unwrap() {
            Inbound::Data(msg) => {
                assert_eq!(msg.stream.as_deref(), Some("v1.order"));
                assert!(msg.result.get("feed").is_some());
            }
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_rejects_garbage() {
        assert!(classify("not json").is_err());
    }
}
