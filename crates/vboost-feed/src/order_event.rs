//! Order stream payload schemas.
//!
//! The private order stream has shipped two payload shapes: a verbose one
//! (`legs`, `metadata`, `state`, `signature`) and a compact one (`l`, `m`,
//! `s1`, `s`). Each is modelled as its own struct and converted once into
//! the canonical `OrderEvent`.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use vboost_core::{CorrelationId, OrderEvent, OrderStatus, Price, Size};

use crate::error::{FeedError, FeedResult};

/// Integer that may be encoded as a JSON number or string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FlexId {
    Num(u64),
    Text(String),
}

impl FlexId {
    fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            Self::Num(n) => u32::try_from(*n).ok().map(CorrelationId),
            Self::Text(s) => s.parse().ok(),
        }
    }
}

/// Boolean that may be encoded as `true` or `"true"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FlexBool {
    Bool(bool),
    Text(String),
}

impl FlexBool {
    fn value(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Self::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
            Self::Text(_) => None,
        }
    }
}

// ============================================================================
// Verbose schema
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FullLeg {
    #[serde(default)]
    instrument: Option<String>,
    #[serde(default)]
    size: Option<Decimal>,
    #[serde(default)]
    limit_price: Option<Decimal>,
    #[serde(default, alias = "is_buying_contract")]
    is_buying_asset: Option<FlexBool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FullMetadata {
    #[serde(default)]
    client_order_id: Option<FlexId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FullSignature {
    #[serde(default)]
    nonce: Option<FlexId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FullState {
    Object {
        #[serde(default, alias = "s")]
        status: Option<String>,
    },
    Text(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FullOrder {
    #[serde(default)]
    legs: Vec<FullLeg>,
    #[serde(default)]
    instrument: Option<String>,
    #[serde(default)]
    metadata: Option<FullMetadata>,
    #[serde(default)]
    signature: Option<FullSignature>,
    #[serde(default)]
    state: Option<FullState>,
    #[serde(default)]
    status: Option<String>,
}

// ============================================================================
// Compact schema
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiteLeg {
    #[serde(default)]
    i: Option<String>,
    #[serde(default)]
    s: Option<Decimal>,
    #[serde(default)]
    lp: Option<Decimal>,
    #[serde(default)]
    ib: Option<FlexBool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LiteMetadata {
    #[serde(default)]
    co: Option<FlexId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LiteState {
    #[serde(default)]
    s: Option<String>,
}

/// `s` is the signature object in most payloads but a bare status string
/// in a few.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum LiteSigOrStatus {
    Signature {
        #[serde(default)]
        n: Option<FlexId>,
    },
    Status(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiteOrder {
    #[serde(default)]
    l: Vec<LiteLeg>,
    #[serde(default)]
    i: Option<String>,
    #[serde(default)]
    m: Option<LiteMetadata>,
    #[serde(default)]
    s: Option<LiteSigOrStatus>,
    #[serde(default)]
    s1: Option<LiteState>,
    #[serde(default)]
    co: Option<FlexId>,
}

/// Known order payload versions.
#[derive(Debug, Clone)]
pub enum OrderPayload {
    Full(FullOrder),
    Lite(LiteOrder),
}

/// Fields shared by both schemas once decoded.
struct Extracted {
    correlation_id: Option<CorrelationId>,
    instrument: Option<String>,
    status: Option<String>,
    leg_size: Option<Decimal>,
    leg_price: Option<Decimal>,
    is_buying: Option<bool>,
}

impl OrderPayload {
    /// Pick the schema from the keys present. `result` may still carry the
    /// `feed` wrapper.
    pub fn from_value(result: &Value) -> FeedResult<Self> {
        let feed = result.get("feed").unwrap_or(result);
        let obj = feed
            .as_object()
            .ok_or_else(|| FeedError::InvalidData(format!("order feed is not an object: {feed}")))?;

        let is_full = ["legs", "metadata", "state", "signature"]
            .iter()
            .any(|k| obj.contains_key(*k));
        let is_lite = ["l", "m", "s1"].iter().any(|k| obj.contains_key(*k));

        if is_full {
            Ok(Self::Full(serde_json::from_value(feed.clone())?))
        } else if is_lite {
            Ok(Self::Lite(serde_json::from_value(feed.clone())?))
        } else {
            Err(FeedError::UnknownSchema(
                obj.keys().cloned().collect::<Vec<_>>().join(","),
            ))
        }
    }

    fn extract(&self) -> Extracted {
        match self {
            Self::Full(o) => {
                let leg = o.legs.first().cloned().unwrap_or_default();
                let status = match &o.state {
                    Some(FullState::Object { status }) => status.clone(),
                    Some(FullState::Text(s)) => Some(s.clone()),
                    None => None,
                }
                .or_else(|| o.status.clone());
                let correlation_id = o
                    .metadata
                    .as_ref()
                    .and_then(|m| m.client_order_id.as_ref())
                    .and_then(FlexId::correlation_id)
                    .or_else(|| {
                        o.signature
                            .as_ref()
                            .and_then(|s| s.nonce.as_ref())
                            .and_then(FlexId::correlation_id)
                    });
                Extracted {
                    correlation_id,
                    instrument: leg.instrument.or_else(|| o.instrument.clone()),
                    status,
                    leg_size: leg.size,
                    leg_price: leg.limit_price,
                    is_buying: leg.is_buying_asset.as_ref().and_then(FlexBool::value),
                }
            }
            Self::Lite(o) => {
                let leg = o.l.first().cloned().unwrap_or_default();
                let (sig_nonce, bare_status) = match &o.s {
                    Some(LiteSigOrStatus::Signature { n }) => (n.as_ref(), None),
                    Some(LiteSigOrStatus::Status(s)) => (None, Some(s.clone())),
                    None => (None, None),
                };
                let status = o.s1.as_ref().and_then(|s| s.s.clone()).or(bare_status);
                let correlation_id = o
                    .m
                    .as_ref()
                    .and_then(|m| m.co.as_ref())
                    .or(o.co.as_ref())
                    .and_then(FlexId::correlation_id)
                    .or_else(|| sig_nonce.and_then(FlexId::correlation_id));
                Extracted {
                    correlation_id,
                    instrument: leg.i.or_else(|| o.i.clone()),
                    status,
                    leg_size: leg.s,
                    leg_price: leg.lp,
                    is_buying: leg.ib.as_ref().and_then(FlexBool::value),
                }
            }
        }
    }

    /// Convert to the canonical event.
    ///
    /// `default_instrument` fills in payloads that omit the instrument when
    /// the subscription is scoped to a single market. Returns `None` when
    /// the status is missing or unknown, or no instrument can be determined.
    pub fn into_event(self, default_instrument: Option<&str>, received_at_ms: u64) -> Option<OrderEvent> {
        let x = self.extract();
        let status: OrderStatus = x.status?.parse().ok()?;
        let instrument = x
            .instrument
            .or_else(|| default_instrument.map(str::to_string))?;

        Some(OrderEvent {
            correlation_id: x.correlation_id,
            instrument,
            status,
            leg_size: x.leg_size.map(Size::new),
            leg_price: x.leg_price.map(Price::new),
            is_buying: x.is_buying,
            received_at_ms,
        })
    }
}

/// Decode a stream result into an event, dropping anything we cannot use.
///
/// Events for a different instrument than `instrument_filter` are dropped.
pub fn normalize_order_message(
    result: &Value,
    instrument_filter: Option<&str>,
    received_at_ms: u64,
) -> Option<OrderEvent> {
    let payload = OrderPayload::from_value(result).ok()?;
    let event = payload.into_event(instrument_filter, received_at_ms)?;
    match instrument_filter {
        Some(want) if !event.instrument.eq_ignore_ascii_case(want) => None,
        _ => Some(event),
    }
}
