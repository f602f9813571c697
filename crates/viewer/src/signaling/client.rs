//! Websocket signaling session

use super::protocol::{InboundMessage, OutboundMessage};
use super::{SignalingEvent, SignalingEventSender, SignalingParams, SignalingSession};
use crate::peer::{IceCandidate, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default bound on the websocket handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Signaling session over a secure websocket
///
/// `open` connects and spawns a sender task and a receiver task. Inbound
/// frames are translated to [`SignalingEvent`]s on the session's event sender.
pub struct WsSignalingSession {
    url: String,
    events: SignalingEventSender,
    connect_timeout: Duration,
    tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl WsSignalingSession {
    /// Create a session for the given channel endpoint
    ///
    /// # Arguments
    ///
    /// * `params` - Channel id, websocket endpoint, client id and clock offset
    /// * `events` - Receives session events once opened
    pub fn new(params: &SignalingParams, events: SignalingEventSender) -> Result<Self> {
        Ok(Self {
            url: Self::connect_url(params)?,
            events,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tx: Mutex::new(None),
            receiver: Mutex::new(None),
        })
    }

    /// Bound the TCP, TLS and websocket handshake of `open`
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Websocket URL with channel, client and date query parameters
    pub fn connect_url(params: &SignalingParams) -> Result<String> {
        let mut url = Url::parse(&params.endpoint).map_err(|e| {
            Error::SignalingError(format!("Invalid endpoint {}: {}", params.endpoint, e))
        })?;

        url.query_pairs_mut()
            .append_pair("X-Amz-ChannelARN", &params.channel_id)
            .append_pair("X-Amz-ClientId", &params.client_id)
            .append_pair("X-Amz-Date", &params.clock_offset.amz_date());

        Ok(url.into())
    }

    /// Session URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether `open` succeeded and `close` has not been called
    pub fn is_open(&self) -> bool {
        self.tx.lock().is_some()
    }

    fn send(&self, msg: OutboundMessage) -> Result<()> {
        let json = msg.to_json()?;
        let guard = self.tx.lock();
        let tx = guard
            .as_ref()
            .ok_or_else(|| Error::SignalingError("Signaling session is not open".to_string()))?;

        debug!(action = ?msg.action, "Sending signaling message");

        tx.send(Message::Text(json))
            .map_err(|_| Error::WebSocketError("Connection closed".to_string()))
    }

    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }

        debug!("Sender task terminated");
    }

    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        events: SignalingEventSender,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => Self::handle_message(&text, &events),
                Ok(Message::Close(_)) => {
                    info!("WebSocket connection closed by service");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    let _ = events.send(SignalingEvent::Error(e.to_string()));
                    break;
                }
                _ => {}
            }
        }

        let _ = events.send(SignalingEvent::Close);
        debug!("Receiver task terminated");
    }

    fn handle_message(text: &str, events: &SignalingEventSender) {
        // Keep-alive frames are empty
        if text.trim().is_empty() {
            return;
        }

        match InboundMessage::from_json(text).and_then(InboundMessage::into_event) {
            Ok(Some(event)) => {
                debug!("Received signaling event: {:?}", event);
                let _ = events.send(event);
            }
            Ok(None) => debug!("Ignoring signaling message: {}", text),
            Err(e) => warn!("Failed to handle signaling message: {}", e),
        }
    }
}

#[async_trait]
impl SignalingSession for WsSignalingSession {
    async fn open(&self) -> Result<()> {
        if self.is_open() {
            return Err(Error::SignalingError(
                "Signaling session already open".to_string(),
            ));
        }

        info!("Connecting to signaling endpoint");

        let connect = connect_async(self.url.as_str());
        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                Error::WebSocketError(format!(
                    "Connection not established after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {}", e)))?;

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, rx));
        let receiver = tokio::spawn(Self::receiver_task(read, self.events.clone()));

        *self.tx.lock() = Some(tx);
        *self.receiver.lock() = Some(receiver);

        info!("Signaling session open");
        let _ = self.events.send(SignalingEvent::Open);

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let tx = self.tx.lock().take();
        if let Some(tx) = tx {
            // Sender task drains this and exits once `tx` is dropped
            let _ = tx.send(Message::Close(None));
        }

        let receiver = self.receiver.lock().take();
        if let Some(receiver) = receiver {
            receiver.abort();
        }

        debug!("Signaling session closed");
        Ok(())
    }

    async fn send_sdp_offer(&self, offer: &SessionDescription) -> Result<()> {
        self.send(OutboundMessage::sdp_offer(offer)?)
    }

    async fn send_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.send(OutboundMessage::ice_candidate(candidate)?)
    }
}

impl Drop for WsSignalingSession {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.get_mut().take() {
            receiver.abort();
        }
    }
}
