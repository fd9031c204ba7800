//! Mock WebSocket server for integration tests.
//!
//! Provides a simple JSON-RPC stream server that can:
//! - Accept connections and record upgrade headers
//! - Acknowledge `subscribe` requests
//! - Record received messages
//! - Push frames to every connected client

use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

type Shared<T> = Arc<Mutex<T>>;

#[derive(Clone, Default)]
struct ServerState {
    messages: Shared<VecDeque<String>>,
    connections: Shared<u32>,
    headers: Shared<Vec<(String, String)>>,
}

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    push_tx: broadcast::Sender<String>,
    state: ServerState,
}

impl MockWsServer {
    /// Start a new mock WebSocket server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = ServerState::default();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (push_tx, _) = broadcast::channel::<String>(64);

        let accept_state = state.clone();
        let accept_push = push_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            accept_state.clone(),
                            accept_push.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            push_tx,
            state,
        }
    }

    /// Get the server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Get the number of connections received.
    pub async fn connection_count(&self) -> u32 {
        *self.state.connections.lock().await
    }

    /// Get all received messages.
    pub async fn received_messages(&self) -> Vec<String> {
        self.state.messages.lock().await.iter().cloned().collect()
    }

    /// Value of an upgrade header from the most recent handshake.
    pub async fn header(&self, name: &str) -> Option<String> {
        self.state
            .headers
            .lock()
            .await
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    /// Send a frame to every connected client.
    pub fn push(&self, frame: serde_json::Value) {
        let _ = self.push_tx.send(frame.to_string());
    }

    /// Wait until at least `count` subscribe requests have arrived.
    pub async fn wait_for_subscriptions(&self, count: usize) -> Vec<serde_json::Value> {
        loop {
            let subs: Vec<serde_json::Value> = self
                .received_messages()
                .await
                .iter()
                .filter_map(|m| serde_json::from_str::<serde_json::Value>(m).ok())
                .filter(|v| v.get("method") == Some(&serde_json::json!("subscribe")))
                .collect();
            if subs.len() >= count {
                return subs;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: ServerState,
    mut push_rx: broadcast::Receiver<String>,
) {
    {
        let mut count = state.connections.lock().await;
        *count += 1;
    }

    let mut captured = Vec::new();
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        for (name, value) in req.headers() {
            if let Ok(v) = value.to_str() {
                captured.push((name.as_str().to_string(), v.to_string()));
            }
        }
        Ok(resp)
    };
    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    state.headers.lock().await.extend(captured);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    state.messages.lock().await.push_back(text.clone());

                    // Acknowledge subscriptions the way the venue does
                    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) {
                        if parsed.get("method") == Some(&serde_json::json!("subscribe")) {
                            let response = serde_json::json!({
                                "jsonrpc": "2.0",
                                "result": {
                                    "stream": parsed["params"]["stream"],
                                    "subs": parsed["params"]["selectors"],
                                },
                                "id": parsed["id"],
                            });
                            let _ = write.send(Message::Text(response.to_string())).await;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
            pushed = push_rx.recv() => match pushed {
                Ok(frame) => {
                    if write.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
