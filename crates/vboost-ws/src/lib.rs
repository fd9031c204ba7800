//! WebSocket client for venue market-data and order streams.
//!
//! Provides robust WebSocket connectivity with:
//! - Automatic reconnection with exponential backoff
//! - Auth headers on the upgrade request (session cookie, account id)
//! - JSON-RPC `subscribe` requests re-sent after every reconnect
//! - Heartbeat monitoring via protocol ping/pong
//! - Channel-based delivery of stream payloads

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use error::{WsError, WsResult};
pub use message::{classify, Inbound, RpcRequest, StreamMessage, StreamSubscription};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
