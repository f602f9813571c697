//! Loopback signaling websocket server
//!
//! Accepts one connection, records the frames the client sends and pushes
//! service frames back.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

pub struct MockSignalingServer {
    /// `ws://` URL of the server
    pub endpoint: String,
    received: mpsc::UnboundedReceiver<Message>,
    outbound: mpsc::UnboundedSender<Message>,
    query: Option<oneshot::Receiver<String>>,
}

impl MockSignalingServer {
    /// Bind to a loopback port and wait for one client
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}", listener.local_addr().unwrap());

        let (received_tx, received) = mpsc::unbounded_channel();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (query_tx, query) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let _ = query_tx.send(req.uri().query().unwrap_or_default().to_string());
                Ok(resp)
            };
            let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();
            let (mut write, mut read) = ws.split();

            tokio::spawn(async move {
                while let Some(msg) = outbound_rx.recv().await {
                    if write.send(msg).await.is_err() {
                        break;
                    }
                }
            });

            while let Some(Ok(msg)) = read.next().await {
                let closing = msg.is_close();
                let _ = received_tx.send(msg);
                if closing {
                    break;
                }
            }
        });

        Self {
            endpoint,
            received,
            outbound,
            query: Some(query),
        }
    }

    /// Query string of the client's upgrade request
    pub async fn query(&mut self) -> String {
        let query = self.query.take().expect("query already taken");
        tokio::time::timeout(Duration::from_secs(2), query)
            .await
            .expect("client never connected")
            .expect("server stopped")
    }

    /// Push a JSON frame to the client
    pub fn push(&self, frame: Value) {
        self.push_raw(&frame.to_string());
    }

    /// Push a raw text frame to the client
    pub fn push_raw(&self, text: &str) {
        self.outbound.send(Message::Text(text.to_string())).unwrap();
    }

    /// Close the connection from the server side
    pub fn close(&self) {
        self.outbound.send(Message::Close(None)).unwrap();
    }

    /// Next frame the client sent
    pub async fn next_frame(&mut self, timeout: Duration) -> Message {
        tokio::time::timeout(timeout, self.received.recv())
            .await
            .expect("no frame received")
            .expect("server stopped")
    }

    /// Next text frame the client sent, parsed as JSON
    pub async fn next_json(&mut self, timeout: Duration) -> Value {
        match self.next_frame(timeout).await {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }
}

/// Base64-encode a JSON payload the way the service does
pub fn encode_payload(value: &Value) -> String {
    STANDARD.encode(value.to_string())
}

/// Decode a base64 JSON payload
pub fn decode_payload(payload: &Value) -> Value {
    let bytes = STANDARD.decode(payload.as_str().unwrap()).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
