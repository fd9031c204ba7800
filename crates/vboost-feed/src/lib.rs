//! Market and order feeds.
//!
//! - `PriceBuffer` / `PriceFeed`: recent bid/ask samples from the public
//!   ticker stream and the "is the external mid stable" check
//! - `OrderPayload` / `OrderEventStream`: the private order stream,
//!   normalized into `OrderEvent`s and indexed for maker confirmation

pub mod error;
pub mod order_event;
pub mod order_stream;
pub mod price_buffer;
pub mod price_feed;
pub mod ticker;

pub use error::{FeedError, FeedResult};
pub use order_event::{normalize_order_message, OrderPayload};
pub use order_stream::{OrderEventStream, OrderIndex, OrderStreamConfig};
pub use price_buffer::{PriceBuffer, PriceSample};
pub use price_feed::{PriceFeed, PriceFeedConfig};
pub use ticker::parse_ticker;

/// Wall-clock time in Unix milliseconds.
pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
